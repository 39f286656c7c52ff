//! Serializable run summary.

use serde::Serialize;

use cropflow_core::{BatchReport, ImageRecordStore, RecordStatus};

/// One processed item in the summary.
#[derive(Debug, Serialize)]
pub struct ItemSummary {
    pub id: String,
    pub name: String,
    pub status: String,
    pub faces: usize,
    pub outputs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate summary of a batch run.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub faces_found: usize,
    pub elapsed_ms: u64,
    pub halted_early: bool,
    pub cancelled: bool,
    pub items: Vec<ItemSummary>,
}

/// Build the summary from the store state plus the streamed results.
pub fn build_summary(store: &ImageRecordStore, report: &BatchReport) -> RunSummary {
    let mut items = Vec::with_capacity(store.len() + report.streamed.len());

    for record in store.iter() {
        let (status, error) = match &record.status {
            RecordStatus::Loaded => ("loaded".to_string(), None),
            RecordStatus::Queued => ("queued".to_string(), None),
            RecordStatus::Processing => ("processing".to_string(), None),
            RecordStatus::Completed => ("completed".to_string(), None),
            RecordStatus::Error(reason) => ("error".to_string(), Some(reason.clone())),
        };
        items.push(ItemSummary {
            id: record.id.clone(),
            name: record.name.clone(),
            status,
            faces: record.faces.len(),
            outputs: record.results.iter().map(|r| r.filename.clone()).collect(),
            error,
        });
    }

    for streamed in &report.streamed {
        items.push(ItemSummary {
            id: streamed.id.clone(),
            name: streamed.name.clone(),
            status: "completed".to_string(),
            faces: streamed.results.len(),
            outputs: streamed.results.iter().map(|r| r.filename.clone()).collect(),
            error: None,
        });
    }

    for failure in &report.failures {
        if failure.id.starts_with("stream-") {
            items.push(ItemSummary {
                id: failure.id.clone(),
                name: failure.name.clone(),
                status: "error".to_string(),
                faces: 0,
                outputs: Vec::new(),
                error: Some(failure.error.clone()),
            });
        }
    }

    RunSummary {
        succeeded: report.succeeded,
        failed: report.failed,
        faces_found: report.faces_found,
        elapsed_ms: report.elapsed.as_millis() as u64,
        halted_early: report.halted_early,
        cancelled: report.cancelled,
        items,
    }
}
