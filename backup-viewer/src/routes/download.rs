//! GET /download - stream one archive member to the client.

use crate::error::AppError;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use backup_reader::utils::paths::basename;
use backup_reader::Extracted;
use bytes::Bytes;
use futures_util::stream;
use serde::Deserialize;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

const CHUNK_SIZE: usize = 64 * 1024;
/// Chunks buffered between the reader thread and the response body
const CHANNEL_DEPTH: usize = 8;

#[derive(Deserialize)]
pub struct DownloadQuery {
    pub archive: PathBuf,
    pub l1: String,
    pub l2: Option<String>,
}

pub async fn download(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, AppError> {
    let l2 = query.l2.filter(|l2| !l2.is_empty());
    let file_name = basename(l2.as_deref().unwrap_or(&query.l1)).to_string();

    tracing::debug!(
        archive = %query.archive.display(),
        l1 = %query.l1,
        l2 = ?l2,
        "Download requested"
    );

    let archive = query.archive;
    let l1 = query.l1;
    let extracted = tokio::task::spawn_blocking(move || {
        state.backups.extract(&archive, &l1, l2.as_deref())
    })
    .await??;
    let size = extracted.size;

    let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(CHANNEL_DEPTH);
    tokio::task::spawn_blocking(move || pump(extracted, tx));
    let body = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    });

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream")),
            (header::CONTENT_DISPOSITION, content_disposition(&file_name)),
            (header::CONTENT_LENGTH, HeaderValue::from(size)),
        ],
        Body::from_stream(body),
    )
        .into_response())
}

/// Copy the member into the channel until it ends, fails or the client leaves.
/// Dropping `extracted` on return releases every handle behind it.
fn pump(mut extracted: Extracted, tx: mpsc::Sender<io::Result<Bytes>>) {
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        match extracted.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if tx.blocking_send(Ok(Bytes::copy_from_slice(&buf[..n]))).is_err() {
                    tracing::debug!("Client disconnected during download");
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::warn!("Download stream failed: {}", e);
                let _ = tx.blocking_send(Err(e));
                break;
            }
        }
    }
}

/// `attachment; filename="..."`, with anything that cannot sit in a quoted
/// header value replaced by `_`.
fn content_disposition(file_name: &str) -> HeaderValue {
    let safe: String = file_name
        .chars()
        .map(|c| match c {
            ' '..='~' if c != '"' && c != '\\' => c,
            _ => '_',
        })
        .collect();
    HeaderValue::from_str(&format!("attachment; filename=\"{safe}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}
