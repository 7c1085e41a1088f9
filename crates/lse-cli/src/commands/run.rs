use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use lse_algo::{LinearStateEstimator, OutputMeasurement};
use lse_cli::feeder::Frame;
use lse_core::LseConfig;
use serde::Serialize;
use tracing::info;

use super::load_model;

#[derive(Serialize)]
struct FrameRecord<'a> {
    frame: usize,
    solved: bool,
    outputs: &'a [OutputMeasurement],
}

pub fn handle(config: &LseConfig, model: &Path, frames: &Path, out: Option<&Path>) -> Result<()> {
    let builder = load_model(model)?;
    let mut estimator = LinearStateEstimator::new(config.estimator.clone());
    estimator
        .initialize(builder)
        .with_context(|| format!("initialising model {}", model.display()))?;

    let contents =
        fs::read_to_string(frames).with_context(|| format!("reading frames {}", frames.display()))?;

    let mut writer: Box<dyn Write> = match out {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let mut count = 0;
    for (line_no, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let frame: Frame = serde_json::from_str(line)
            .with_context(|| format!("{}:{}: malformed frame", frames.display(), line_no + 1))?;
        // Failed frames are logged by the estimator and yield no outputs
        let solved = estimator.process_frame(frame).is_ok();
        let record = FrameRecord {
            frame: count,
            solved,
            outputs: estimator.outputs(),
        };
        serde_json::to_writer(&mut writer, &record)?;
        writeln!(writer)?;
        count += 1;
    }
    writer.flush()?;

    info!("{}", estimator.counters());
    if let Some(path) = out {
        println!("Wrote {} frames to {}", count, path.display());
    }
    Ok(())
}
