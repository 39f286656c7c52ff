//! Streaming intake for large input sets.
//!
//! Small sets decode immediately. Larger sets decode one page up front and
//! keep the remainder as undecoded file references in page-sized batches, so
//! the resident tail never exceeds one page regardless of how many files were
//! enqueued. Pages are decoded on demand via [`StreamingLoader::load_next_page`]
//! (driven by an external trigger such as a scroll/visibility signal) or
//! drained wholesale into a batch run.

use std::{collections::VecDeque, path::PathBuf, sync::Arc};

use log::{info, warn};

use crate::decode::ImageDecoder;
use crate::records::{ImageRecord, ImageRecordStore, SourceRef};

/// Files decoded per page.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// A file reference that has not been decoded yet.
#[derive(Debug, Clone)]
pub struct PendingFile {
    pub path: PathBuf,
    /// Output-name override from the spreadsheet mapping.
    pub output_name: Option<String>,
}

impl PendingFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            output_name: None,
        }
    }

    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// A page-sized group of undecoded references.
#[derive(Debug, Clone)]
pub struct FileBatch {
    files: Vec<PendingFile>,
}

impl FileBatch {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Result of an intake: decoded records plus bookkeeping about the queued tail.
pub struct IntakeOutcome {
    /// Records decoded immediately, in input order.
    pub immediate: Vec<ImageRecord>,
    /// Page-sized batches now held undecoded.
    pub queued_batches: usize,
    /// Files rejected during decode: (file name, reason).
    pub rejected: Vec<(String, String)>,
}

/// Paginating loader bounding the resident working set.
pub struct StreamingLoader {
    page_size: usize,
    queue: VecDeque<FileBatch>,
    next_seq: u64,
}

impl Default for StreamingLoader {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl StreamingLoader {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            queue: VecDeque::new(),
            next_seq: 1,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of undecoded batches currently queued.
    pub fn queued_batches(&self) -> usize {
        self.queue.len()
    }

    /// Number of undecoded files across all queued batches.
    pub fn pending_files(&self) -> usize {
        self.queue.iter().map(FileBatch::len).sum()
    }

    /// Take in a set of files. At most one page is decoded now; the rest is
    /// queued as undecoded references.
    pub fn enqueue(
        &mut self,
        mut files: Vec<PendingFile>,
        decoder: &dyn ImageDecoder,
    ) -> IntakeOutcome {
        let (now, later) = if files.len() <= self.page_size {
            (files, Vec::new())
        } else {
            let tail = files.split_off(self.page_size);
            (files, tail)
        };

        let mut rejected = Vec::new();
        let immediate = self.decode_files(now, decoder, &mut rejected);

        let mut queued = 0usize;
        for chunk in later.chunks(self.page_size) {
            self.queue.push_back(FileBatch {
                files: chunk.to_vec(),
            });
            queued += 1;
        }

        if queued > 0 {
            info!(
                "queued {} file(s) in {} page(s) of {}",
                self.pending_files(),
                queued,
                self.page_size
            );
        }

        IntakeOutcome {
            immediate,
            queued_batches: queued,
            rejected,
        }
    }

    /// Decode the next queued batch and insert its records into the store.
    /// Returns the number of records inserted; 0 when the queue is empty.
    pub fn load_next_page(
        &mut self,
        store: &mut ImageRecordStore,
        decoder: &dyn ImageDecoder,
    ) -> usize {
        let Some(batch) = self.queue.pop_front() else {
            return 0;
        };
        let mut rejected = Vec::new();
        let records = self.decode_files(batch.files, decoder, &mut rejected);
        let inserted = records.len();
        for record in records {
            store.upsert(record);
        }
        inserted
    }

    /// Hand the entire undecoded tail to the caller (e.g. a batch run that
    /// will decode, process, and discard each file itself).
    pub fn drain_pending(&mut self) -> Vec<PendingFile> {
        self.queue.drain(..).flat_map(|batch| batch.files).collect()
    }

    fn decode_files(
        &mut self,
        files: Vec<PendingFile>,
        decoder: &dyn ImageDecoder,
        rejected: &mut Vec<(String, String)>,
    ) -> Vec<ImageRecord> {
        let mut records = Vec::with_capacity(files.len());
        for pending in files {
            match decoder.decode(&pending.path) {
                Ok(image) => {
                    let seq = self.next_seq;
                    self.next_seq += 1;
                    let mut record = ImageRecord::new(
                        format!("img-{seq:04}"),
                        pending.display_name(),
                        SourceRef::Path(pending.path.clone()),
                        Some(Arc::new(image)),
                    );
                    record.output_name = pending.output_name;
                    records.push(record);
                }
                Err(err) => {
                    warn!("rejected {}: {err}", pending.display_name());
                    rejected.push((pending.display_name(), err.to_string()));
                }
            }
        }
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::FsDecoder;
    use crate::error::DecodeError;
    use crate::memory::ManualPolicy;
    use image::DynamicImage;
    use std::cell::Cell;
    use std::path::Path;

    /// Synthesizes pixels instead of touching the filesystem, counting decodes.
    struct SyntheticDecoder {
        decodes: Cell<usize>,
    }

    impl SyntheticDecoder {
        fn new() -> Self {
            Self {
                decodes: Cell::new(0),
            }
        }
    }

    impl ImageDecoder for SyntheticDecoder {
        fn decode(&self, _path: &Path) -> Result<DynamicImage, DecodeError> {
            self.decodes.set(self.decodes.get() + 1);
            Ok(DynamicImage::ImageRgba8(image::RgbaImage::new(16, 16)))
        }
    }

    fn pending(count: usize) -> Vec<PendingFile> {
        (0..count)
            .map(|i| PendingFile::new(format!("photo_{i:03}.jpg")))
            .collect()
    }

    #[test]
    fn small_sets_decode_entirely() {
        let mut loader = StreamingLoader::default();
        let decoder = SyntheticDecoder::new();
        let outcome = loader.enqueue(pending(5), &decoder);
        assert_eq!(outcome.immediate.len(), 5);
        assert_eq!(outcome.queued_batches, 0);
        assert_eq!(loader.pending_files(), 0);
    }

    #[test]
    fn five_hundred_files_yield_one_page_and_24_batches() {
        let mut loader = StreamingLoader::new(20);
        let decoder = SyntheticDecoder::new();
        let outcome = loader.enqueue(pending(500), &decoder);

        assert_eq!(outcome.immediate.len(), 20);
        assert_eq!(outcome.queued_batches, 24);
        assert_eq!(loader.queued_batches(), 24);
        assert_eq!(loader.pending_files(), 480);
        // Only the first page was decoded; the tail is held as references.
        assert_eq!(decoder.decodes.get(), 20);
    }

    #[test]
    fn load_next_page_decodes_one_batch_at_a_time() {
        let mut loader = StreamingLoader::new(20);
        let decoder = SyntheticDecoder::new();
        let mut store = ImageRecordStore::new(Box::new(ManualPolicy));

        let outcome = loader.enqueue(pending(500), &decoder);
        for record in outcome.immediate {
            store.upsert(record);
        }

        let mut pages = 0;
        while loader.queued_batches() > 0 {
            let before = decoder.decodes.get();
            let inserted = loader.load_next_page(&mut store, &decoder);
            assert_eq!(inserted, 20);
            // Exactly one batch decoded per call.
            assert_eq!(decoder.decodes.get() - before, 20);
            pages += 1;
        }
        assert_eq!(pages, 24);
        assert_eq!(store.len(), 500);
        assert_eq!(loader.load_next_page(&mut store, &decoder), 0);
    }

    #[test]
    fn drain_pending_returns_the_whole_tail_in_order() {
        let mut loader = StreamingLoader::new(10);
        let decoder = SyntheticDecoder::new();
        loader.enqueue(pending(35), &decoder);

        let tail = loader.drain_pending();
        assert_eq!(tail.len(), 25);
        assert_eq!(tail[0].display_name(), "photo_010.jpg");
        assert_eq!(tail[24].display_name(), "photo_034.jpg");
        assert_eq!(loader.queued_batches(), 0);
    }

    #[test]
    fn rejected_files_are_reported_not_queued() {
        struct PickyDecoder;
        impl ImageDecoder for PickyDecoder {
            fn decode(&self, path: &Path) -> Result<DynamicImage, DecodeError> {
                if path.to_string_lossy().contains("002") {
                    Err(DecodeError::Io {
                        name: path.display().to_string(),
                        source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
                    })
                } else {
                    Ok(DynamicImage::ImageRgba8(image::RgbaImage::new(16, 16)))
                }
            }
        }

        let mut loader = StreamingLoader::default();
        let outcome = loader.enqueue(pending(4), &PickyDecoder);
        assert_eq!(outcome.immediate.len(), 3);
        assert_eq!(outcome.rejected.len(), 1);
        assert!(outcome.rejected[0].0.contains("002"));
    }

    #[test]
    fn fs_decoder_is_the_default_seam() {
        // Compile-time check that the trait object seam accepts the real decoder.
        let decoder = FsDecoder::default();
        let mut loader = StreamingLoader::default();
        let outcome = loader.enqueue(Vec::new(), &decoder);
        assert!(outcome.immediate.is_empty());
    }
}
