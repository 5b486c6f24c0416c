//! Receipt import: turn a QR code photo or a DANFE PDF into data for a
//! pre-filled expense form.
//!
//! Every stage is best effort. A failed stage is logged and the caller gets
//! whatever was read up to that point.

pub mod danfe_pdf;
pub mod inference;
pub mod nfce_html;
pub mod qr;
pub mod url_guard;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::PaymentMethod;
use crate::services::installments::MAX_INSTALLMENTS;
use qr::QrDecoder;
use url_guard::{validate_url, Resolver, SystemResolver, UrlRejection, ValidatedUrl};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/120.0";

#[derive(Error, Debug)]
pub enum ReceiptError {
    #[error("unsupported file type: {0}")]
    UnsupportedFile(String),

    #[error("could not read image: {0}")]
    Image(String),

    #[error("no QR code found in the image")]
    NoQrCode,

    #[error("URL rejected: {0}")]
    Blocked(#[from] UrlRejection),

    #[error("could not fetch receipt page: {0}")]
    Fetch(String),

    #[error("could not read PDF: {0}")]
    Pdf(String),

    #[error("background task failed: {0}")]
    Task(String),
}

impl ReceiptError {
    /// Message shown on the import form.
    pub fn user_message(&self) -> &'static str {
        match self {
            ReceiptError::UnsupportedFile(_) => "Envie uma imagem (JPG ou PNG) ou um PDF.",
            ReceiptError::Image(_) | ReceiptError::NoQrCode => {
                "Não foi possível ler o QR Code."
            }
            ReceiptError::Blocked(_) => "O link do QR Code não é permitido.",
            ReceiptError::Fetch(_) => "Não foi possível consultar a nota na SEFAZ.",
            ReceiptError::Pdf(_) => "Não foi possível ler o PDF.",
            ReceiptError::Task(_) => "Falha ao processar o arquivo.",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReceiptItem {
    pub name: String,
    pub code: Option<String>,
    pub quantity_milli: i64,
    pub unit: Option<String>,
    pub unit_price_cents: i64,
    pub total_cents: i64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReceiptData {
    pub issuer_name: Option<String>,
    /// Formatted CNPJ, only set when its checksum is valid.
    pub issuer_tax_id: Option<String>,
    pub date: Option<NaiveDate>,
    pub total_cents: i64,
    pub discount_cents: i64,
    pub payment_text: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    /// Number of payment entries; 0 when unknown.
    pub installments: u32,
    pub items: Vec<ReceiptItem>,
}

impl ReceiptData {
    pub fn installment_suggestion(&self) -> i64 {
        (self.installments as i64).clamp(1, MAX_INSTALLMENTS)
    }
}

/// Where an import came from; decides the default issuer and notes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiptSource {
    QrCode { url: Option<String> },
    File,
}

impl ReceiptSource {
    pub fn default_issuer(&self) -> &'static str {
        match self {
            ReceiptSource::QrCode { .. } => "Compra NFC-e",
            ReceiptSource::File => "Consumidor",
        }
    }

    pub fn notes(&self) -> String {
        match self {
            ReceiptSource::QrCode { url: Some(url) } => {
                format!("Importado via QR Code.\nLink SEFAZ: {url}")
            }
            ReceiptSource::QrCode { url: None } => "Importado via QR Code.".to_string(),
            ReceiptSource::File => "Importado via arquivo.".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Image,
    Pdf,
}

/// Accept JPEG, PNG and PDF uploads, by content type or file extension.
pub fn classify_upload(content_type: Option<&str>, file_name: Option<&str>) -> Option<UploadKind> {
    let content_type = content_type.unwrap_or("").to_ascii_lowercase();
    let file_name = file_name.unwrap_or("").to_ascii_lowercase();

    if content_type == "application/pdf" || file_name.ends_with(".pdf") {
        Some(UploadKind::Pdf)
    } else if matches!(content_type.as_str(), "image/jpeg" | "image/jpg" | "image/png")
        || [".jpg", ".jpeg", ".png"].iter().any(|ext| file_name.ends_with(ext))
    {
        Some(UploadKind::Image)
    } else {
        None
    }
}

/// Result of an import: what was read plus the first failure, if any.
#[derive(Debug)]
pub struct ImportResult {
    pub source: ReceiptSource,
    pub data: ReceiptData,
    pub error: Option<ReceiptError>,
}

fn http_client(
    timeout: Duration,
    pin: Option<(&str, &[SocketAddr])>,
) -> reqwest::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::none());
    if let Some((host, addrs)) = pin {
        builder = builder.resolve_to_addrs(host, addrs);
    }
    builder.build()
}

/// Runs the import pipeline. Holds the HTTP client, the QR decoder and the
/// resolver used by the URL guard.
pub struct ReceiptImporter {
    client: reqwest::Client,
    timeout: Duration,
    decoder: Arc<QrDecoder>,
    resolver: Arc<dyn Resolver>,
}

impl ReceiptImporter {
    pub fn new(timeout: Duration) -> Result<Self, ReceiptError> {
        Self::with_resolver(timeout, Arc::new(SystemResolver))
    }

    pub fn with_resolver(
        timeout: Duration,
        resolver: Arc<dyn Resolver>,
    ) -> Result<Self, ReceiptError> {
        let client = http_client(timeout, None).map_err(|e| ReceiptError::Fetch(e.to_string()))?;

        Ok(Self {
            client,
            timeout,
            decoder: Arc::new(QrDecoder::new()),
            resolver,
        })
    }

    /// Import an uploaded file. Never fails; problems are reported in
    /// [`ImportResult::error`].
    pub async fn import(&self, kind: UploadKind, bytes: Vec<u8>) -> ImportResult {
        match kind {
            UploadKind::Image => self.import_image(bytes).await,
            UploadKind::Pdf => self.import_pdf(bytes).await,
        }
    }

    async fn import_image(&self, bytes: Vec<u8>) -> ImportResult {
        let decoder = self.decoder.clone();
        let decoded = tokio::task::spawn_blocking(move || decoder.decode(&bytes))
            .await
            .map_err(|e| ReceiptError::Task(e.to_string()))
            .and_then(|r| r);

        let url = match decoded {
            Ok(url) => url,
            Err(err) => {
                warn!(error = %err, "QR code decoding failed");
                return ImportResult {
                    source: ReceiptSource::QrCode { url: None },
                    data: ReceiptData::default(),
                    error: Some(err),
                };
            }
        };
        info!(url = %url, "Decoded receipt QR code");

        let (data, error) = self.import_url(&url).await;
        ImportResult {
            source: ReceiptSource::QrCode { url: Some(url) },
            data,
            error,
        }
    }

    /// Scrape the receipt page a QR code points at, falling back to the
    /// values carried in the URL.
    pub async fn import_url(&self, url: &str) -> (ReceiptData, Option<ReceiptError>) {
        let from_url = nfce_html::parse_qr_url(url);
        let (mut data, error) = match self.fetch_page(url).await {
            Ok(html) => (nfce_html::parse(&html), None),
            Err(err) => {
                warn!(url = %url, error = %err, "Receipt page could not be read");
                (ReceiptData::default(), Some(err))
            }
        };

        if data.date.is_none() {
            data.date = from_url.date;
        }
        if data.total_cents == 0 {
            data.total_cents = from_url.total_cents.unwrap_or(0);
        }
        if data.issuer_tax_id.is_none() {
            data.issuer_tax_id = from_url.issuer_tax_id();
        }

        (data, error)
    }

    async fn fetch_page(&self, url: &str) -> Result<String, ReceiptError> {
        let resolver = self.resolver.clone();
        let raw = url.to_string();
        let checked = tokio::task::spawn_blocking(move || validate_url(&raw, resolver.as_ref()))
            .await
            .map_err(|e| ReceiptError::Task(e.to_string()))??;

        let response = self
            .client_for(&checked)?
            .get(checked.url)
            .send()
            .await
            .map_err(|e| ReceiptError::Fetch(e.to_string()))?;

        let status = response.status();
        if status.is_redirection() {
            return Err(ReceiptError::Fetch(format!("redirect not followed ({status})")));
        }
        let response = response
            .error_for_status()
            .map_err(|e| ReceiptError::Fetch(e.to_string()))?;

        let html = response
            .text()
            .await
            .map_err(|e| ReceiptError::Fetch(e.to_string()))?;
        debug!(url = %url, bytes = html.len(), "Fetched receipt page");
        Ok(html)
    }

    /// Client that connects only to the addresses the guard approved. A
    /// hostname is pinned to them so the connector never looks it up again.
    fn client_for(&self, checked: &ValidatedUrl) -> Result<reqwest::Client, ReceiptError> {
        match checked.pinned_host() {
            Some(host) => http_client(self.timeout, Some((host, &checked.addrs)))
                .map_err(|e| ReceiptError::Fetch(e.to_string())),
            None => Ok(self.client.clone()),
        }
    }

    async fn import_pdf(&self, bytes: Vec<u8>) -> ImportResult {
        let parsed = tokio::task::spawn_blocking(move || {
            danfe_pdf::extract_text(&bytes).map(|text| danfe_pdf::parse_text(&text))
        })
        .await
        .map_err(|e| ReceiptError::Task(e.to_string()))
        .and_then(|r| r);

        let (data, error) = match parsed {
            Ok(data) => {
                info!(items = data.items.len(), "Parsed DANFE PDF");
                (data, None)
            }
            Err(err) => {
                warn!(error = %err, "DANFE PDF could not be parsed");
                (ReceiptData::default(), Some(err))
            }
        };

        ImportResult {
            source: ReceiptSource::File,
            data,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_upload() {
        assert_eq!(classify_upload(Some("image/png"), None), Some(UploadKind::Image));
        assert_eq!(classify_upload(Some("image/jpeg"), Some("nota.jpg")), Some(UploadKind::Image));
        assert_eq!(classify_upload(Some("application/pdf"), None), Some(UploadKind::Pdf));
        assert_eq!(
            classify_upload(Some("application/octet-stream"), Some("DANFE.PDF")),
            Some(UploadKind::Pdf)
        );
        assert_eq!(classify_upload(Some("text/plain"), Some("nota.txt")), None);
        assert_eq!(classify_upload(None, None), None);
    }

    #[test]
    fn test_source_notes() {
        let qr = ReceiptSource::QrCode {
            url: Some("https://sefaz.example/nfce?p=1".into()),
        };
        assert_eq!(
            qr.notes(),
            "Importado via QR Code.\nLink SEFAZ: https://sefaz.example/nfce?p=1"
        );
        assert_eq!(ReceiptSource::File.notes(), "Importado via arquivo.");
        assert_eq!(ReceiptSource::File.default_issuer(), "Consumidor");
    }

    #[test]
    fn test_installment_suggestion_is_clamped() {
        let mut data = ReceiptData::default();
        assert_eq!(data.installment_suggestion(), 1);
        data.installments = 40;
        assert_eq!(data.installment_suggestion(), MAX_INSTALLMENTS);
    }

    #[tokio::test]
    async fn test_private_qr_target_falls_back_to_url_values() {
        struct Loopback;
        impl Resolver for Loopback {
            fn resolve(&self, _: &str, _: u16) -> std::io::Result<Vec<std::net::IpAddr>> {
                Ok(vec!["127.0.0.1".parse().unwrap()])
            }
        }

        let importer =
            ReceiptImporter::with_resolver(Duration::from_secs(1), Arc::new(Loopback)).unwrap();
        let (data, error) = importer
            .import_url("http://nfce.sefaz.rs.gov.br/x?chNFe=43240311222333000181650010000123451000123456&vNF=12.34")
            .await;

        assert!(matches!(
            error,
            Some(ReceiptError::Blocked(UrlRejection::BlockedAddress(_)))
        ));
        assert_eq!(data.total_cents, 1234);
        assert_eq!(data.issuer_tax_id.as_deref(), Some("11.222.333/0001-81"));
    }

    #[test]
    fn test_unreadable_image_reports_image_error() {
        let importer = ReceiptImporter::new(Duration::from_secs(1)).unwrap();
        let result = tokio_test::block_on(importer.import(UploadKind::Image, b"GIF89a".to_vec()));

        assert!(matches!(result.error, Some(ReceiptError::Image(_))));
        assert_eq!(result.source, ReceiptSource::QrCode { url: None });
        assert_eq!(result.data, ReceiptData::default());
    }
}
