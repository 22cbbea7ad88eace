use dotenv::dotenv;
use pnl_irregularities::extraction::{
    ExtractionEvent, GeminiClient, PdfTableExtractor, DEFAULT_MODEL,
};
use pnl_irregularities::{render_anomaly_table, AnalysisConfig, PnlAnalyzer, RawTable};
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    let api_key = std::env::var("GEMINI_API_KEY").expect("GEMINI_API_KEY must be set");

    let doc_dir = Path::new("demos").join("documents");
    let mut dir_stream = fs::read_dir(&doc_dir).await?;
    let mut pdf_paths: Vec<PathBuf> = Vec::new();
    while let Ok(Some(entry)) = dir_stream.next_entry().await {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "pdf") {
            pdf_paths.push(path);
        }
    }

    if pdf_paths.is_empty() {
        println!("⚠️  No PDF files found in {:?}.", doc_dir);
        return Ok(());
    }

    let client = GeminiClient::new(api_key);
    let extractor = PdfTableExtractor::new(client, DEFAULT_MODEL);

    let (tx, mut rx) = mpsc::channel(32);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                ExtractionEvent::Starting { document } => {
                    println!("🔄 Reading {}...", document)
                }
                ExtractionEvent::Sending { bytes } => {
                    println!("☁️  Sending {} bytes to Gemini...", bytes)
                }
                ExtractionEvent::Parsing => println!("⚙️  Parsing response..."),
                ExtractionEvent::Success { rows, columns } => {
                    println!("✅ Extracted {} rows x {} columns", rows, columns)
                }
                ExtractionEvent::Failed { reason } => println!("❌ {}", reason),
            }
        }
    });

    let mut tables = Vec::new();
    for path in &pdf_paths {
        match extractor.extract_path(path, Some(tx.clone())).await {
            Ok(table) => tables.push(table),
            Err(e) => println!("⚠️  Skipping {:?}: {}", path, e),
        }
    }
    drop(tx);
    printer.await?;

    if tables.is_empty() {
        println!("No tables could be extracted.");
        return Ok(());
    }

    let raw = RawTable::concat(&tables);
    let report = PnlAnalyzer::analyze(&raw, &AnalysisConfig::default())?;

    println!("\n{}\n", report.summary());
    print!("{}", render_anomaly_table(&report.anomalies));

    Ok(())
}
