//! DANFE (printed NF-e) PDF parsing.
//!
//! Works on the plain text produced by `pdf-extract`. Items come from a
//! column table when one is recognizable, otherwise from the free-text
//! product section, anchoring each item on its 8-digit NCM tariff code.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

use super::inference::{clean_description, parse_number, to_cents, to_milli};
use super::{ReceiptData, ReceiptError, ReceiptItem};
use crate::date_utils::parse_br_date;
use crate::services::cnpj;
use crate::text_utils::{fold_lower, squash_whitespace};

/// How far into the document a printed CNPJ is looked for.
const HEADER_CHARS: usize = 3000;

fn column_gap_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s{2,}").expect("invalid column regex"))
}

fn section_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(DADOS|CALCULO|TRANSPORTADOR|INFORMACOES|RESERVADO)")
            .expect("invalid section regex")
    })
}

fn products_start_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)DADOS DOS? PRODUTOS?").expect("invalid products regex"))
}

fn products_end_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(C[ÁA]LCULO DO ISSQN|DADOS ADICIONAIS|TRANSPORTADOR)")
            .expect("invalid products end regex")
    })
}

fn column_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(C[ÓO]DIGO|PRODUTO|NCM/SH|NCM|SH|CST|CFOP|UNID|QTD|VLR|VALOR|BC|ICMS|IPI|ALIQ)")
            .expect("invalid column header regex")
    })
}

fn ncm_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{4}\.?\d{2}\.?\d{2}\b").expect("invalid ncm regex"))
}

fn unit_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(UN|UND|UNID\.?|PC|PÇ|PÇS|PCS|KG|G|L|LT|CX|UNIDADE)$")
            .expect("invalid unit marker regex")
    })
}

fn numeric_only_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[\d.,/\s-]+$").expect("invalid numeric regex"))
}

fn receiver_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)RECEBEMOS\s+DE\s+(.*?)\s+(OS\s+PRODUTOS|AS\s+MERCADORIAS|CONSTANTES)")
            .expect("invalid receiver regex")
    })
}

fn issuer_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(IDENTIFICA[ÇC][ÃA]O\s+DO\s+EMITENTE|DANFE)\s*")
            .expect("invalid issuer prefix regex")
    })
}

fn access_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{4}(?:[ .]?\d{4}){10}").expect("invalid access key regex"))
}

fn printed_cnpj_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\d{2}\.\d{3}\.\d{3}/\d{4}-\d{2}").expect("invalid printed cnpj regex")
    })
}

fn emission_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)EMISS[ÃA]O.*?\s+(\d{2}/\d{2}/\d{4})").expect("invalid emission regex")
    })
}

fn invoice_total_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)VALOR\s+TOTAL\s+DA\s+NOTA").expect("invalid total regex"))
}

fn money_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\d.]+,\d{2}").expect("invalid money regex"))
}

/// Extract the text of a PDF held in memory.
pub fn extract_text(bytes: &[u8]) -> Result<String, ReceiptError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ReceiptError::Pdf(e.to_string()))
}

/// Read issuer, CNPJ, date, total and items from DANFE text.
pub fn parse_text(text: &str) -> ReceiptData {
    let mut items = table_items(text);
    if items.is_empty() {
        items = free_text_items(text);
    }

    let total_cents =
        invoice_total(text).unwrap_or_else(|| items.iter().map(|i| i.total_cents).sum());

    ReceiptData {
        issuer_name: issuer(text),
        issuer_tax_id: tax_id(text),
        date: emission_date(text),
        total_cents,
        items,
        ..ReceiptData::default()
    }
}

fn split_columns(line: &str) -> Vec<&str> {
    column_gap_re()
        .split(line.trim())
        .filter(|c| !c.is_empty())
        .collect()
}

fn folded_upper(s: &str) -> String {
    fold_lower(s).to_uppercase()
}

struct Columns {
    count: usize,
    description: Option<usize>,
    quantity: Option<usize>,
    unit_price: Option<usize>,
    total: usize,
}

impl Columns {
    fn from_header(line: &str) -> Option<Self> {
        let cells: Vec<String> = split_columns(line).iter().map(|c| folded_upper(c)).collect();
        let has_description = cells.iter().any(|c| c.contains("DESC"));
        let has_quantity_or_unit = cells.iter().any(|c| c.contains("QTD") || c.contains("UNIT"));
        if !(has_description && has_quantity_or_unit) {
            return None;
        }

        let mut description = None;
        let mut quantity = None;
        let mut unit_price = None;
        let mut total = None;
        for (idx, cell) in cells.iter().enumerate() {
            if cell.contains("DESC") {
                description = Some(idx);
            } else if cell.contains("QTD") {
                quantity = Some(idx);
            } else if cell.contains("UNIT") {
                unit_price = Some(idx);
            } else if cell.contains("TOTAL") {
                total = Some(idx);
            }
        }

        Some(Self {
            count: cells.len(),
            description,
            quantity,
            unit_price,
            total: total?,
        })
    }

    fn read_row(&self, cells: &[&str]) -> Option<ReceiptItem> {
        if cells.len() != self.count {
            return None;
        }

        let total = parse_number(cells[self.total]);
        if total <= 0.0 {
            return None;
        }

        let raw_description = self.description.map(|i| cells[i]).unwrap_or("Item");
        if raw_description.len() > 200 {
            return None;
        }

        let mut quantity = self.quantity.map(|i| parse_number(cells[i])).unwrap_or(1.0);
        if quantity == 0.0 {
            quantity = 1.0;
        }
        let mut unit_price = self
            .unit_price
            .map(|i| parse_number(cells[i]))
            .unwrap_or(total);
        if unit_price == 0.0 {
            unit_price = total / quantity;
        }

        Some(ReceiptItem {
            name: clean_description(raw_description),
            code: None,
            quantity_milli: to_milli(quantity),
            unit: Some("UN".to_string()),
            unit_price_cents: to_cents(unit_price),
            total_cents: to_cents(total),
        })
    }
}

fn table_items(text: &str) -> Vec<ReceiptItem> {
    let lines: Vec<&str> = text.lines().collect();
    let mut items = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let Some(columns) = Columns::from_header(lines[i]) else {
            i += 1;
            continue;
        };
        i += 1;

        while i < lines.len() {
            let line = lines[i].trim();
            if line.is_empty() || section_re().is_match(&folded_upper(line)) {
                break;
            }
            if let Some(item) = columns.read_row(&split_columns(line)) {
                items.push(item);
            }
            i += 1;
        }
    }

    items
}

enum Token {
    UnitMark,
    Number(f64),
}

/// Quantity, unit price and total read from the text after an NCM code.
fn item_values(tail: &str) -> (Option<f64>, Option<f64>, Option<f64>) {
    let tokens: Vec<Token> = tail
        .split_whitespace()
        .filter_map(|t| {
            if unit_marker_re().is_match(t) {
                Some(Token::UnitMark)
            } else {
                let v = parse_number(t);
                (v > 0.0).then_some(Token::Number(v))
            }
        })
        .collect();

    let numbers = |tokens: &[Token]| -> Vec<f64> {
        tokens
            .iter()
            .filter_map(|t| match t {
                Token::Number(v) => Some(*v),
                Token::UnitMark => None,
            })
            .collect()
    };

    let (mut quantity, mut unit, mut total) =
        match tokens.iter().position(|t| matches!(t, Token::UnitMark)) {
            Some(mark) => {
                let after = numbers(&tokens[mark + 1..]);
                (after.first().copied(), after.get(1).copied(), after.get(2).copied())
            }
            None => {
                let all = numbers(&tokens[..]);
                let n = all.len();
                (
                    n.checked_sub(3).map(|i| all[i]),
                    n.checked_sub(2).map(|i| all[i]),
                    all.last().copied(),
                )
            }
        };

    if total.is_none() {
        if let (Some(u), Some(q)) = (unit, quantity) {
            total = Some(u * q);
        }
    }
    if unit.is_none() {
        if let (Some(t), Some(q)) = (total, quantity) {
            if q != 0.0 {
                unit = Some(t / q);
            }
        }
    }
    if quantity.is_none() {
        if let (Some(t), Some(u)) = (total, unit) {
            if u != 0.0 {
                quantity = Some(t / u);
            }
        }
    }

    (quantity, unit, total)
}

fn free_text_items(text: &str) -> Vec<ReceiptItem> {
    let Some(start) = products_start_re().find(text) else {
        return Vec::new();
    };
    let end = products_end_re()
        .find(&text[start.end()..])
        .map(|m| start.end() + m.start())
        .unwrap_or(text.len());

    let mut items = Vec::new();
    let mut buffer: Vec<&str> = Vec::new();
    let mut waiting_values = false;

    for line in text[start.start()..end].lines().map(str::trim) {
        if line.is_empty() || products_start_re().is_match(line) || column_header_re().is_match(line)
        {
            continue;
        }

        let Some(ncm) = ncm_re().find(line) else {
            if !waiting_values && !numeric_only_re().is_match(line) && line.len() < 150 {
                buffer.push(line);
            }
            continue;
        };

        let prefix = line[..ncm.start()].trim();
        let mut parts: Vec<&str> = std::mem::take(&mut buffer);
        if !prefix.is_empty() {
            parts.push(prefix);
        }
        let name = (!parts.is_empty())
            .then(|| clean_description(&parts.join(" ")))
            .filter(|n| n.len() < 250);

        let (quantity, unit, total) = item_values(&line[ncm.end()..]);

        match (name, total) {
            (Some(name), Some(total)) => {
                let quantity = quantity.filter(|q| *q > 0.0).unwrap_or(1.0);
                items.push(ReceiptItem {
                    name,
                    code: None,
                    quantity_milli: to_milli(quantity),
                    unit: Some("UN".to_string()),
                    unit_price_cents: to_cents(unit.unwrap_or(0.0)),
                    total_cents: to_cents(total),
                });
                waiting_values = false;
            }
            _ => waiting_values = true,
        }
    }

    items
}

const COMPANY_MARKERS: &[&str] = &["LTDA", "S.A.", "S/A", "COMERCIO", "EIRELI", "KABUM", "WEBSHOP"];
const COMPANY_SUFFIXES: &[&str] = &["ME", "EPP"];

fn looks_like_company(line: &str) -> bool {
    let upper = folded_upper(line);
    COMPANY_MARKERS.iter().any(|m| upper.contains(m))
        || upper
            .split_whitespace()
            .any(|w| COMPANY_SUFFIXES.contains(&w.trim_matches(|c: char| !c.is_alphanumeric())))
}

fn issuer(text: &str) -> Option<String> {
    if let Some(c) = receiver_re().captures(text) {
        let candidate = squash_whitespace(&c[1]);
        if !candidate.is_empty() && candidate.len() < 100 {
            return Some(candidate);
        }
    }

    text.lines()
        .take(25)
        .map(str::trim)
        .filter(|l| l.len() > 3 && l.len() < 100 && looks_like_company(l))
        .map(|l| issuer_prefix_re().replace(l, "").trim().to_string())
        .find(|l| !l.is_empty())
}

fn tax_id(text: &str) -> Option<String> {
    let from_key = access_key_re()
        .find_iter(text)
        .map(|m| cnpj::digits_only(m.as_str()))
        .filter_map(|key| key.get(6..20).map(str::to_string))
        .find(|candidate| cnpj::is_valid(candidate));
    if let Some(found) = from_key {
        return Some(cnpj::format(&found));
    }

    let head_end = text
        .char_indices()
        .nth(HEADER_CHARS)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    printed_cnpj_re()
        .find_iter(&text[..head_end])
        .map(|m| m.as_str().to_string())
        .find(|c| cnpj::is_valid(c))
}

fn emission_date(text: &str) -> Option<NaiveDate> {
    emission_re()
        .captures(text)
        .and_then(|c| parse_br_date(&c[1]))
}

/// Last money value on the label's line or the line after it.
fn invoice_total(text: &str) -> Option<i64> {
    let label = invoice_total_re().find(text)?;
    let after = &text[label.end()..];
    let window: String = after
        .lines()
        .enumerate()
        .filter(|(i, l)| *i == 0 || !l.trim().is_empty())
        .take(2)
        .map(|(_, l)| l)
        .collect::<Vec<_>>()
        .join(" ");

    money_re()
        .find_iter(&window)
        .last()
        .map(|m| to_cents(parse_number(m.as_str())))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE_DANFE: &str = "\
RECEBEMOS DE KABUM COMERCIO ELETRONICO S.A. OS PRODUTOS CONSTANTES DA NOTA FISCAL
DANFE
CHAVE DE ACESSO
3524 0311 2223 3300 0181 5500 1000 0123 4510 0012 3456
DATA DA EMISSÃO
12/03/2024
CÁLCULO DO IMPOSTO
BASE DE CÁLC. DO ICMS    VALOR DO ICMS    VALOR TOTAL DA NOTA
0,00    0,00    1.349,80

DADOS DOS PRODUTOS / SERVIÇOS
CÓDIGO    DESCRIÇÃO DO PRODUTO    NCM    QTD    VLR. UNIT    VLR. TOTAL
001    MOUSE GAMER RGB    84716053    2,0000    74,90    149,80
002    MONITOR 24 POL    85285200    1,0000    1.200,00    1.200,00

DADOS ADICIONAIS
";

    #[test]
    fn test_parse_table_danfe() {
        let data = parse_text(TABLE_DANFE);

        assert_eq!(
            data.issuer_name.as_deref(),
            Some("KABUM COMERCIO ELETRONICO S.A.")
        );
        assert_eq!(data.issuer_tax_id.as_deref(), Some("11.222.333/0001-81"));
        assert_eq!(data.date, NaiveDate::from_ymd_opt(2024, 3, 12));
        assert_eq!(data.total_cents, 134980);

        assert_eq!(data.items.len(), 2);
        assert_eq!(data.items[0].name, "MOUSE GAMER RGB");
        assert_eq!(data.items[0].quantity_milli, 2000);
        assert_eq!(data.items[0].unit_price_cents, 7490);
        assert_eq!(data.items[0].total_cents, 14980);
        assert_eq!(data.items[1].total_cents, 120000);
    }

    const FREE_TEXT_DANFE: &str = "\
IDENTIFICAÇÃO DO EMITENTE LOJA DO BAIRRO LTDA
Rua das Flores, 100
CNPJ 11.222.333/0001-81
DADOS DO PRODUTO / SERVIÇO
CÓDIGO PRODUTO DESCRIÇÃO NCM/SH CST CFOP UN QTD VLR.UNIT VLR.TOTAL
CAFE TORRADO
001 MOIDO 500G 09012100 000 5102 UN 3,0000 15,50 46,50
ACUCAR REFINADO 1KG 17019900 000 5102 KG 2,0000 4,25
DADOS ADICIONAIS
";

    #[test]
    fn test_parse_free_text_danfe() {
        let data = parse_text(FREE_TEXT_DANFE);

        assert_eq!(data.issuer_name.as_deref(), Some("LOJA DO BAIRRO LTDA"));
        assert_eq!(data.issuer_tax_id.as_deref(), Some("11.222.333/0001-81"));
        assert_eq!(data.date, None);

        assert_eq!(data.items.len(), 2);
        assert_eq!(data.items[0].name, "CAFE TORRADO 001 MOIDO 500G");
        assert_eq!(data.items[0].quantity_milli, 3000);
        assert_eq!(data.items[0].unit_price_cents, 1550);
        assert_eq!(data.items[0].total_cents, 4650);

        // Total inferred from quantity and unit price.
        assert_eq!(data.items[1].name, "ACUCAR REFINADO 1KG");
        assert_eq!(data.items[1].total_cents, 850);

        assert_eq!(data.total_cents, 5500);
    }

    #[test]
    fn test_item_values_without_unit_marker() {
        let (q, u, t) = item_values("000 5102 2,0000 10,00 20,00");
        assert_eq!(t, Some(20.0));
        assert_eq!(u, Some(10.0));
        assert_eq!(q, Some(2.0));
    }

    #[test]
    fn test_unrelated_text_yields_nothing() {
        let data = parse_text("Relatório mensal\nSem nota fiscal aqui");
        assert!(data.items.is_empty());
        assert_eq!(data.issuer_name, None);
        assert_eq!(data.total_cents, 0);
    }
}
