use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use burn::tensor::{Tensor, backend::Backend};
use serde::{Deserialize, Serialize};

use crate::error::{BeganError, Result};
use crate::image_ops::save_image;

/// One scalar data point in the event log.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ScalarEvent {
    pub step: usize,
    pub tag: String,
    pub value: f64,
}

/// Append-only summary log under `<model_dir>/summaries`.
///
/// Scalars go to `events.jsonl`, one JSON object per line; image summaries
/// are written as PNG grids to `images/{step}_{tag}.png`.
pub struct SummaryWriter {
    dir: PathBuf,
    events: BufWriter<File>,
}

impl SummaryWriter {
    pub const EVENTS_FILE: &'static str = "events.jsonl";

    /// Opens (or creates) the summary directory under `model_dir` and
    /// appends to an existing event log, so resumed runs keep their history.
    pub fn new(model_dir: &Path) -> Result<Self> {
        let dir = model_dir.join("summaries");
        std::fs::create_dir_all(dir.join("images"))?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(Self::EVENTS_FILE))?;

        Ok(Self {
            dir,
            events: BufWriter::new(file),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Appends one event per `(tag, value)` pair at `step`. Nothing reaches
    /// disk until [`Self::flush`].
    pub fn add_scalars(&mut self, step: usize, scalars: &[(&str, f64)]) -> Result<()> {
        for (tag, value) in scalars {
            let event = ScalarEvent {
                step,
                tag: tag.to_string(),
                value: *value,
            };
            serde_json::to_writer(&mut self.events, &event)?;
            self.events.write_all(b"\n")?;
        }
        Ok(())
    }

    /// Saves an NHWC `[0, 255]` batch as the image summary `tag` for `step`.
    pub fn add_images<B: Backend>(
        &mut self,
        step: usize,
        tag: &str,
        images: Tensor<B, 4>,
    ) -> Result<()> {
        let path = self.dir.join("images").join(format!("{step}_{tag}.png"));
        save_image(images, &path, 8)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.events.flush()?;
        Ok(())
    }
}

/// Reads back every scalar event of a summary directory.
pub fn read_scalars(summary_dir: &Path) -> Result<Vec<ScalarEvent>> {
    let contents = std::fs::read_to_string(summary_dir.join(SummaryWriter::EVENTS_FILE))?;
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str::<ScalarEvent>(line).map_err(BeganError::from))
        .collect()
}
