use crate::error::{PnlError, Result};
use crate::extraction::{client::GeminiClient, types::*};
use crate::ingestion::table_from_extraction_text;
use crate::table::RawTable;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::{info, warn};
use std::path::Path;
use tokio::sync::mpsc::Sender;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

const DEFAULT_SYSTEM_PROMPT: &str = "You read financial statements. Find the Profit & Loss table \
in the attached document and return it as a JSON array with one object per table row. \
Use the table's column headers as keys, keep every cell exactly as printed \
(currency symbols, thousands separators, parentheses and percent signs included), \
and use an empty string for blank cells. Return only the JSON array.";

pub struct PdfTableExtractor {
    client: GeminiClient,
    model: String,
    system_prompt: String,
}

impl PdfTableExtractor {
    pub fn new(client: GeminiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Extracts the first P&L table from an in-memory document.
    ///
    /// The MIME type is guessed from `display_name`; unknown extensions are
    /// sent as `application/pdf`.
    pub async fn extract_bytes(
        &self,
        bytes: &[u8],
        display_name: &str,
        progress: Option<Sender<ExtractionEvent>>,
    ) -> Result<RawTable> {
        self.send_event(
            &progress,
            ExtractionEvent::Starting {
                document: display_name.to_string(),
            },
        )
        .await;

        let mime_type = mime_guess::from_path(display_name)
            .first()
            .map(|m| m.to_string())
            .unwrap_or_else(|| "application/pdf".to_string());

        let message = Content::user(vec![
            Part::text(format!(
                "Extract the Profit & Loss table from \"{}\".",
                display_name
            )),
            Part::InlineData {
                inline_data: InlineData {
                    mime_type,
                    data: STANDARD.encode(bytes),
                },
            },
        ]);

        self.send_event(&progress, ExtractionEvent::Sending { bytes: bytes.len() })
            .await;
        let text = match self
            .client
            .generate_content(&self.model, &self.system_prompt, vec![message])
            .await
        {
            Ok(text) => text,
            Err(e) => return self.fail(&progress, e).await,
        };

        self.send_event(&progress, ExtractionEvent::Parsing).await;
        match table_from_extraction_text(&text) {
            Ok(table) => {
                info!(
                    "Extracted {} rows x {} columns from {}",
                    table.row_count(),
                    table.columns().len(),
                    display_name
                );
                self.send_event(
                    &progress,
                    ExtractionEvent::Success {
                        rows: table.row_count(),
                        columns: table.columns().len(),
                    },
                )
                .await;
                Ok(table)
            }
            Err(e) => self.fail(&progress, e).await,
        }
    }

    pub async fn extract_path(
        &self,
        path: impl AsRef<Path>,
        progress: Option<Sender<ExtractionEvent>>,
    ) -> Result<RawTable> {
        let path = path.as_ref();
        let display_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| PnlError::ExtractionFailed("Invalid file name".to_string()))?
            .to_string();
        let bytes = tokio::fs::read(path).await?;
        self.extract_bytes(&bytes, &display_name, progress).await
    }

    async fn fail(
        &self,
        progress: &Option<Sender<ExtractionEvent>>,
        err: PnlError,
    ) -> Result<RawTable> {
        warn!("Table extraction failed: {}", err);
        self.send_event(
            progress,
            ExtractionEvent::Failed {
                reason: err.to_string(),
            },
        )
        .await;
        Err(err)
    }

    async fn send_event(&self, sender: &Option<Sender<ExtractionEvent>>, event: ExtractionEvent) {
        if let Some(tx) = sender {
            let _ = tx.send(event).await;
        }
    }
}
