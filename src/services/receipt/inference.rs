//! Number normalization, description cleanup and category/payment guesses
//! for imported receipts.

use std::sync::OnceLock;

use regex::Regex;

use crate::models::{Category, PaymentMethod};
use crate::text_utils::{fold_lower, squash_whitespace};

fn noise_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\d,.\-]").expect("invalid noise regex"))
}

fn first_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-?\d[\d.,]*").expect("invalid number regex"))
}

/// Parse a Brazilian or US formatted number, ignoring currency symbols and
/// other noise. `"R$ 1.234,56"` and `"1,234.56"` both give `1234.56`.
/// Anything unparseable gives `0.0`.
pub fn parse_number(raw: &str) -> f64 {
    let s = noise_re().replace_all(raw.trim(), "");
    let s = s.trim_matches(|c| c == '.' || c == ',');
    if s.is_empty() {
        return 0.0;
    }

    let normalized = match (s.rfind(','), s.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => s.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => s.replace(',', ""),
        (Some(_), None) => s.replace(',', "."),
        _ => s.to_string(),
    };

    normalized.parse().unwrap_or(0.0)
}

/// First number appearing in `text`, parsed with [`parse_number`].
pub fn number_in(text: &str) -> Option<f64> {
    first_number_re()
        .find(text)
        .map(|m| parse_number(m.as_str()))
}

pub fn to_cents(value: f64) -> i64 {
    (value * 100.0).round() as i64
}

pub fn to_milli(value: f64) -> i64 {
    (value * 1000.0).round() as i64
}

const COLUMN_JARGON: &[&str] = &[
    "PRODUTO", "DESCRICAO", "CODIGO", "SERVICO", "ICMS", "IPI", "ALIQ", "VALOR", "UNIT", "TOTAL",
    "BC", "UNID", "QTD", "NCM", "CST", "CFOP",
];

fn is_jargon(word: &str) -> bool {
    let folded = fold_lower(word).to_uppercase().replace('.', "");
    COLUMN_JARGON.iter().any(|j| folded.contains(j))
}

/// Strip leading and trailing table-header words from an item description.
pub fn clean_description(raw: &str) -> String {
    let mut words: Vec<&str> = raw.split_whitespace().collect();
    while words.first().is_some_and(|w| is_jargon(w)) {
        words.remove(0);
    }
    while words.last().is_some_and(|w| is_jargon(w)) {
        words.pop();
    }
    let cleaned = words.join(" ");
    if cleaned.is_empty() {
        "Item".to_string()
    } else {
        squash_whitespace(&cleaned)
    }
}

/// Issuer keywords per default category word, checked in order.
/// Keywords of three letters or fewer only match whole words.
const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "Mercado",
        &[
            "supermercado", "mercado", "zaffari", "carrefour", "big", "nacional", "atacado",
            "bistek", "center shop", "stock center", "maxxi", "macromix", "assai", "makro",
            "atacadao", "pao de acucar", "condor", "angeloni", "fort atacadista", "savegnago",
            "guanabara", "sonda", "festval", "tenda", "todo dia",
        ],
    ),
    (
        "Farmácia",
        &[
            "farmacia", "drogaria", "panvel", "sao joao", "pague menos", "raia", "drogasil",
            "bifarma", "ultrafarma", "extrafarma", "pacheco", "drogasmil", "nissei", "venancio",
        ],
    ),
    (
        "Transporte",
        &[
            "posto", "combustivel", "ipiranga", "shell", "petrobras", "uber", "99pop",
            "abastecimento", "br distribuidora", "esso", "texaco", "raizen", "cabify",
            "estacionamento", "pedagio", "sem parar", "veloe", "conectcar", "pneu", "borracharia",
            "mecanica",
        ],
    ),
    (
        "Alimentação",
        &[
            "restaurante", "lancheria", "burger", "mcdonalds", "subway", "ifood", "bar",
            "padaria", "confeitaria", "pizzaria", "bobs", "habib", "giraffas", "spoleto",
            "outback", "china in box", "ragazzo", "madero", "rappi", "ze delivery", "lanchonete",
            "sorveteria", "acai",
        ],
    ),
    (
        "Vestuário",
        &[
            "lojas renner", "riachuelo", "c&a", "zara", "cea", "marisa", "pompeia", "shein",
            "hering", "shoulder", "polo wear", "nike", "adidas", "centauro", "decathlon",
            "pernambucanas", "netshoes", "track&field", "reserva",
        ],
    ),
    (
        "Casa",
        &[
            "ferragem", "construcao", "leroy", "cassol", "telhanorte", "eletrica", "dicico",
            "obramax", "sodimac", "tok stok", "etna", "camicado", "moveis",
        ],
    ),
    (
        "Eletrônicos",
        &[
            "kabum", "pichau", "terabyte", "kalunga", "dell", "samsung", "apple",
            "magazine luiza", "casas bahia", "ponto frio", "fast shop", "americanas",
            "mercado livre", "amazon", "submarino", "shoptime", "multilaser", "positivo",
            "lenovo", "motorola", "xiaomi",
        ],
    ),
    (
        "Saúde",
        &[
            "hospital", "clinica", "laboratorio", "consulta", "medico", "dentista", "odonto",
            "unimed", "hapvida", "amil", "sulamerica", "bradesco saude", "fleury", "delboni",
            "hermes pardini", "einstein",
        ],
    ),
    (
        "Educação",
        &[
            "escola", "faculdade", "curso", "universidade", "kumon", "wizard", "ccaa", "fisk",
            "cultura inglesa", "cursinho", "senac", "senai", "udemy", "hotmart",
        ],
    ),
    (
        "Lazer",
        &[
            "cinema", "cinemark", "cinepolis", "kinoplex", "teatro", "ingresso.com", "eventim",
            "sympla", "parque", "clube", "boliche", "netflix", "spotify", "disney", "globoplay",
        ],
    ),
    (
        "Pet Shop",
        &[
            "pet shop", "petz", "cobasi", "petlove", "agropecuaria", "veterinaria",
            "banho e tosa", "racao",
        ],
    ),
    (
        "Serviços",
        &[
            "salao", "barbearia", "estetica", "academia", "smartfit", "bluefit", "bio ritmo",
            "bodytech", "lavanderia", "costureira", "assistencia tecnica", "conserto",
        ],
    ),
    (
        "Seguros",
        &[
            "seguro", "porto seguro", "liberty", "allianz", "mapfre", "tokio marine",
        ],
    ),
];

fn keyword_matches(text: &str, words: &[&str], keyword: &str) -> bool {
    if keyword.len() <= 3 {
        words.contains(&keyword)
    } else {
        text.contains(keyword)
    }
}

/// Category word suggested by the issuer name, if any keyword matches.
pub fn suggest_category_keyword(issuer: &str) -> Option<&'static str> {
    let text = fold_lower(issuer);
    let words: Vec<&str> = text
        .split(|c: char| !c.is_alphanumeric() && c != '&')
        .filter(|w| !w.is_empty())
        .collect();

    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| keyword_matches(&text, &words, k)))
        .map(|(category, _)| *category)
}

/// Id of the first category (in the given order) whose name contains the
/// suggested word, ignoring case and accents.
pub fn infer_category(categories: &[Category], issuer: &str) -> Option<i64> {
    let suggestion = fold_lower(suggest_category_keyword(issuer)?);
    categories
        .iter()
        .find(|c| fold_lower(&c.name).contains(&suggestion))
        .map(|c| c.id)
}

/// Payment method named in a receipt's payment text.
pub fn infer_payment_method(text: &str) -> Option<PaymentMethod> {
    let t = fold_lower(text);
    if t.contains("credito") {
        Some(PaymentMethod::Credito)
    } else if t.contains("debito") {
        Some(PaymentMethod::Debito)
    } else if t.contains("pix") {
        Some(PaymentMethod::Pix)
    } else if t.contains("dinheiro") || t.contains("especie") {
        Some(PaymentMethod::Dinheiro)
    } else if t.contains("boleto") {
        Some(PaymentMethod::Boleto)
    } else if t.contains("alimentacao") {
        Some(PaymentMethod::ValeAlimentacao)
    } else if t.contains("refeicao") {
        Some(PaymentMethod::ValeRefeicao)
    } else {
        None
    }
}
