use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use yank_core::{event::ProgressSink, plan::ChunkPlan};

const BAR_TEMPLATE: &str =
    "{prefix:>10} [{bar:40.cyan/blue}] {bytes:>10}/{total_bytes:10} {bytes_per_sec:>12}";

/// One progress bar per chunk, sized to the chunk's expected bytes.
pub struct ChunkBars {
    multi: MultiProgress,
    bars: Vec<ProgressBar>,
}

impl ChunkBars {
    pub fn new(hidden: bool) -> Self {
        let multi = if hidden {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        } else {
            MultiProgress::new()
        };
        ChunkBars {
            multi,
            bars: Vec::new(),
        }
    }
}

impl ProgressSink for ChunkBars {
    fn on_start(&mut self, plan: &ChunkPlan) {
        let style = ProgressStyle::with_template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        self.bars = plan
            .iter()
            .map(|chunk| {
                let bar = self.multi.add(ProgressBar::new(chunk.expected_size()));
                bar.set_style(style.clone());
                bar.set_prefix(format!("worker {}", chunk.id + 1));
                bar
            })
            .collect();
    }

    fn on_progress(&mut self, chunk_id: u32, completed: u64) {
        if let Some(bar) = self.bars.get(chunk_id as usize) {
            bar.set_position(completed);
        }
    }

    fn on_finish(&mut self) {
        for bar in &self.bars {
            if bar.position() >= bar.length().unwrap_or(0) {
                bar.finish();
            } else {
                bar.abandon();
            }
        }
    }
}
