use std::time::Duration;

use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

pub fn create_stage_bar(multi: &MultiProgress, stages: usize) -> Result<ProgressBar> {
    let pb = multi.add(ProgressBar::new(stages as u64));
    pb.set_style(ProgressStyle::with_template(
        "{bar:40.cyan/blue} {pos}/{len} stages\n{msg} | elapsed: {elapsed_precise}",
    )?);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message("reading input");
    Ok(pb)
}

/// Moves the bar to the stage about to run.
pub fn enter_stage(pb: &ProgressBar, index: usize, name: &str) {
    pb.set_position(index as u64);
    pb.set_message(format!("running {name}"));
}

pub fn finish_stage_bar(pb: &ProgressBar, message: String) {
    if let Some(len) = pb.length() {
        pb.set_position(len);
    }
    pb.finish_with_message(message);
}
