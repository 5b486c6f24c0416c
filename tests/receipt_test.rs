//! Receipt upload: file routing, QR failures, PDF failures and the URL
//! guard in front of the SEFAZ fetch.

mod common;

use std::io::{self, Cursor};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use bpcash::services::receipt::url_guard::Resolver;
use bpcash::services::receipt::{ReceiptError, ReceiptImporter, UploadKind};
use chrono::NaiveDate;
use common::TestClient;

fn blank_png() -> Vec<u8> {
    let image = image::RgbImage::from_pixel(64, 64, image::Rgb([255, 255, 255]));
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, image::ImageFormat::Png)
        .unwrap();
    bytes.into_inner()
}

/// Resolves every host to one fixed address.
struct FixedResolver(IpAddr);

impl Resolver for FixedResolver {
    fn resolve(&self, _host: &str, _port: u16) -> io::Result<Vec<IpAddr>> {
        Ok(vec![self.0])
    }
}

#[tokio::test]
async fn test_import_page_renders() {
    let client = TestClient::new();
    client.signup("maria@example.com", "3000").await;

    let response = client.get("/import").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("/import/upload?_xsrf_token="));
}

#[tokio::test]
async fn test_unsupported_file_is_rejected() {
    let client = TestClient::new();
    client.signup("maria@example.com", "3000").await;

    let response = client
        .post_file("/import/upload", "notas.txt", "text/plain", b"hello")
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body.contains("Envie uma imagem (JPG ou PNG) ou um PDF."));
}

#[tokio::test]
async fn test_empty_upload_is_rejected() {
    let client = TestClient::new();
    client.signup("maria@example.com", "3000").await;

    let response = client
        .post_file("/import/upload", "nota.png", "image/png", b"")
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_image_without_qr_prefills_form() {
    let client = TestClient::new();
    client.signup("maria@example.com", "3000").await;

    let response = client
        .post_file("/import/upload", "nota.png", "image/png", &blank_png())
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("Não foi possível ler o QR Code."));
    assert!(response.body.contains("Importado via QR Code."));
    assert!(response.body.contains("Compra NFC-e"));
    assert!(response.body.contains("/expenses/create"));

    // Nothing is saved until the form is submitted.
    let conn = client.state.db.get().unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM expenses", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_unreadable_pdf_prefills_form() {
    let client = TestClient::new();
    client.signup("maria@example.com", "3000").await;

    let response = client
        .post_file(
            "/import/upload",
            "danfe.pdf",
            "application/pdf",
            b"%PDF-1.4 this is not really a pdf",
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("Importado via arquivo."));
    assert!(response.body.contains("Consumidor"));
}

#[tokio::test]
async fn test_upload_requires_xsrf_token() {
    let client = TestClient::new();
    client.signup("maria@example.com", "3000").await;

    let response = client
        .post_file_unchecked("/import/upload", "nota.png", "image/png", &blank_png())
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_loopback_receipt_url_is_blocked() {
    let importer = ReceiptImporter::new(Duration::from_secs(1)).unwrap();
    let (data, error) = importer
        .import_url(
            "http://127.0.0.1/nfce?chNFe=43240311222333000181650010000123451000123456&dhEmi=2024-03-12T14:22:10-03:00&vNF=55.00",
        )
        .await;

    assert!(matches!(error, Some(ReceiptError::Blocked(_))));
    // Values carried by the URL still come through.
    assert_eq!(data.total_cents, 5500);
    assert_eq!(data.date, NaiveDate::from_ymd_opt(2024, 3, 12));
    assert_eq!(data.issuer_tax_id.as_deref(), Some("11.222.333/0001-81"));
}

#[tokio::test]
async fn test_hostname_resolving_to_private_address_is_blocked() {
    let importer = ReceiptImporter::with_resolver(
        Duration::from_secs(1),
        Arc::new(FixedResolver("10.0.0.7".parse().unwrap())),
    )
    .unwrap();

    let (data, error) = importer
        .import_url("https://www.sefaz.rs.gov.br/NFCE/NFCE-COM.aspx?p=abc")
        .await;
    assert!(matches!(error, Some(ReceiptError::Blocked(_))));
    assert_eq!(data.total_cents, 0);
}

#[tokio::test]
async fn test_fetch_connects_only_to_checked_address() {
    // A local service the fetch must never reach.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    tokio::spawn(async move {
        use tokio::io::AsyncWriteExt;
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            let body = r#"<div class="txtTopo">INTERNAL SERVICE</div>"#;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
        }
    });

    // The guard sees a public address; the system would say loopback.
    let importer = ReceiptImporter::with_resolver(
        Duration::from_millis(500),
        Arc::new(FixedResolver("200.198.160.10".parse().unwrap())),
    )
    .unwrap();
    let (data, _) = importer
        .import_url(&format!("http://localhost:{port}/nfce"))
        .await;

    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_ne!(data.issuer_name.as_deref(), Some("INTERNAL SERVICE"));
}

#[tokio::test]
async fn test_import_routes_by_kind() {
    let importer = ReceiptImporter::new(Duration::from_secs(1)).unwrap();

    let result = importer.import(UploadKind::Image, b"not an image".to_vec()).await;
    assert!(matches!(result.error, Some(ReceiptError::Image(_))));
    assert_eq!(result.source.notes(), "Importado via QR Code.");

    let result = importer.import(UploadKind::Pdf, b"garbage".to_vec()).await;
    assert!(result.error.is_some());
    assert_eq!(result.source.notes(), "Importado via arquivo.");
}
