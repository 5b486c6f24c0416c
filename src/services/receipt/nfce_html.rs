//! NFC-e consumer receipt pages (the SEFAZ portal a receipt QR code points
//! to) and the parameters carried by the QR code URL itself.

use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};

use super::inference::{infer_payment_method, number_in, parse_number, to_cents, to_milli};
use super::{ReceiptData, ReceiptItem};
use crate::date_utils::parse_br_date;
use crate::models::PaymentMethod;
use crate::services::cnpj;
use crate::text_utils::squash_whitespace;

fn selector(cell: &'static OnceLock<Selector>, css: &str) -> &'static Selector {
    cell.get_or_init(|| Selector::parse(css).expect("invalid selector"))
}

fn issuer_sel() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    selector(&SEL, "div.txtTopo")
}

fn total_block_sel() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    selector(&SEL, "#totalNota")
}

fn total_line_sel() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    selector(&SEL, "#linhaTotal")
}

fn label_sel() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    selector(&SEL, "label")
}

fn payment_label_sel() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    selector(&SEL, "label.tx")
}

fn total_value_sel() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    selector(&SEL, "span.totalNumb")
}

fn item_row_sel() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    selector(&SEL, r#"table#tabResult tr[id^="Item"]"#)
}

fn item_name_sel() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    selector(&SEL, "span.txtTit")
}

fn item_code_sel() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    selector(&SEL, "span.RCod")
}

fn item_qty_sel() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    selector(&SEL, "span.Rqtd")
}

fn item_unit_sel() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    selector(&SEL, "span.RUN")
}

fn item_unit_price_sel() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    selector(&SEL, "span.RvlUnit")
}

fn item_total_sel() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    selector(&SEL, "span.valor")
}

fn cnpj_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"CNPJ[:\s]*(\d{2}\.\d{3}\.\d{3}/\d{4}-\d{2})").expect("invalid cnpj regex")
    })
}

fn emission_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)Emiss[ãa]o\s*:?\s*(\d{2}/\d{2}/\d{4})").expect("invalid emission regex")
    })
}

fn company_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)Raz[ãa]o Social[:\s]+(.+?)\s*CNPJ").expect("invalid company regex")
    })
}

fn code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)c[óo]digo\s*:?\s*([^)\s]+)").expect("invalid code regex"))
}

fn unit_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)UN\s*:\s*([a-z]+)").expect("invalid unit regex"))
}

fn row_total_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)Vl\.?\s*Total[:\s]*R?\$?\s*([\d.,]+)").expect("invalid row total regex")
    })
}

fn sefaz_state_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"sefaz\.([a-z]{2})\.").expect("invalid state regex"))
}

fn text_of(el: ElementRef) -> String {
    squash_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

fn first_text(el: ElementRef, sel: &Selector) -> Option<String> {
    el.select(sel).next().map(text_of).filter(|t| !t.is_empty())
}

/// Extract what can be read from a receipt page. Missing parts stay empty.
pub fn parse(html: &str) -> ReceiptData {
    let doc = Html::parse_document(html);
    let full_text = text_of(doc.root_element());

    let mut data = ReceiptData {
        issuer_name: doc
            .select(issuer_sel())
            .next()
            .map(text_of)
            .filter(|t| !t.is_empty())
            .or_else(|| {
                company_name_re()
                    .captures(&full_text)
                    .map(|c| c[1].trim().to_string())
            }),
        issuer_tax_id: cnpj_re()
            .captures_iter(&full_text)
            .map(|c| c[1].to_string())
            .find(|c| cnpj::is_valid(c)),
        date: emission_re()
            .captures(&full_text)
            .and_then(|c| parse_br_date(&c[1])),
        ..ReceiptData::default()
    };

    if let Some(block) = doc.select(total_block_sel()).next() {
        read_totals(block, &mut data);
        read_payments(block, &mut data);
    }

    data.items = doc.select(item_row_sel()).map(parse_item).collect();
    data
}

fn read_totals(block: ElementRef, data: &mut ReceiptData) {
    let mut total_cents = 0;
    for line in block.select(total_line_sel()) {
        let (Some(label), Some(value)) = (
            first_text(line, label_sel()),
            first_text(line, total_value_sel()),
        ) else {
            continue;
        };
        let label = label.to_lowercase();
        let cents = to_cents(parse_number(&value));

        if label.contains("descontos") {
            data.discount_cents = cents;
        } else if label.contains("valor a pagar") {
            total_cents = cents;
        } else if label.contains("valor total") && total_cents == 0 {
            total_cents = cents;
        }
    }
    data.total_cents = total_cents;
}

fn read_payments(block: ElementRef, data: &mut ReceiptData) {
    let mut after_form = false;
    let mut payments = Vec::new();

    for child in block.children().filter_map(ElementRef::wrap) {
        match child.value().id() {
            Some("linhaForma") => after_form = true,
            Some("linhaTotal") if after_form => {
                if let Some(text) = first_text(child, payment_label_sel()) {
                    if !text.to_lowercase().contains("troco") {
                        payments.push(text);
                    }
                }
            }
            _ => {}
        }
    }

    if let Some(first) = payments.first() {
        data.installments = payments.len() as u32;
        data.payment_method = infer_payment_method(first);
        data.payment_text = Some(first.clone());
        return;
    }

    let credit_mentions = text_of(block)
        .to_lowercase()
        .matches("cartão de crédito")
        .count();
    if credit_mentions > 0 {
        data.installments = credit_mentions as u32;
        data.payment_method = Some(PaymentMethod::Credito);
    }
}

fn parse_item(row: ElementRef) -> ReceiptItem {
    let name = first_text(row, item_name_sel()).unwrap_or_else(|| "Item".to_string());

    let code = first_text(row, item_code_sel())
        .and_then(|t| code_re().captures(&t).map(|c| c[1].to_string()));

    let quantity = first_text(row, item_qty_sel())
        .and_then(|t| number_in(&t))
        .filter(|q| *q > 0.0)
        .unwrap_or(1.0);

    let unit = first_text(row, item_unit_sel())
        .and_then(|t| unit_re().captures(&t).map(|c| c[1].to_uppercase()))
        .or_else(|| Some("UN".to_string()));

    let unit_price = first_text(row, item_unit_price_sel())
        .and_then(|t| number_in(&t))
        .unwrap_or(0.0);

    let total = match first_text(row, item_total_sel()) {
        Some(t) => parse_number(&t),
        None => row_total_re()
            .captures(&text_of(row))
            .map(|c| parse_number(&c[1]))
            .unwrap_or(quantity * unit_price),
    };

    ReceiptItem {
        name,
        code,
        quantity_milli: to_milli(quantity),
        unit,
        unit_price_cents: to_cents(unit_price),
        total_cents: to_cents(total),
    }
}

/// Data carried by the QR code URL itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QrUrlInfo {
    /// 44-digit access key.
    pub access_key: Option<String>,
    /// Two-letter state code from `sefaz.<uf>.` hosts, uppercase.
    pub state: Option<String>,
    pub date: Option<NaiveDate>,
    pub total_cents: Option<i64>,
}

impl QrUrlInfo {
    /// Issuer CNPJ embedded in the access key (digits 7 to 20).
    pub fn issuer_tax_id(&self) -> Option<String> {
        let key = self.access_key.as_deref()?;
        let candidate = key.get(6..20)?;
        cnpj::is_valid(candidate).then(|| cnpj::format(candidate))
    }
}

fn decode_hex_ascii(s: &str) -> Option<String> {
    if s.len() < 20 || s.len() % 2 != 0 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let bytes = (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect::<Option<Vec<u8>>>()?;
    String::from_utf8(bytes).ok().filter(|t| t.is_ascii())
}

fn parse_qr_date(raw: &str) -> Option<NaiveDate> {
    let text = decode_hex_ascii(raw).unwrap_or_else(|| raw.to_string());
    let head = text.get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_br_date(head))
}

fn parse_qr_total(raw: &str) -> Option<i64> {
    raw.replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(to_cents)
}

fn access_key(raw: &str) -> Option<String> {
    let digits = cnpj::digits_only(raw);
    (digits.len() == 44).then_some(digits)
}

/// Read the access key, emission date and total from a QR code URL, either
/// from the pipe-separated `p=` payload or the `chNFe`/`dhEmi`/`vNF`
/// parameters.
pub fn parse_qr_url(raw: &str) -> QrUrlInfo {
    let Ok(url) = Url::parse(raw.trim()) else {
        return QrUrlInfo::default();
    };

    let mut info = QrUrlInfo {
        state: url.host_str().and_then(|h| {
            sefaz_state_re()
                .captures(&h.to_lowercase())
                .map(|c| c[1].to_uppercase())
        }),
        ..QrUrlInfo::default()
    };

    let query: HashMap<String, String> = url.query_pairs().into_owned().collect();

    match query.get("p").filter(|p| p.contains('|')) {
        Some(payload) => {
            let parts: Vec<&str> = payload.split('|').collect();
            info.access_key = parts.first().and_then(|k| access_key(k));
            if parts.len() >= 5 {
                info.date = parse_qr_date(parts[3]);
                info.total_cents = parse_qr_total(parts[4]);
            }
        }
        None => {
            info.access_key = query
                .get("chNFe")
                .or_else(|| query.get("chave"))
                .and_then(|k| access_key(k));
            info.date = query.get("dhEmi").and_then(|d| parse_qr_date(d));
            info.total_cents = query.get("vNF").and_then(|v| parse_qr_total(v));
        }
    }

    info
}
