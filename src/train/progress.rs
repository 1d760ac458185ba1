use std::fmt;
use std::io::{self, Write};
use std::time::{Duration, Instant};

use crate::train::running_stat::RunningStat;

/// Which pass `run_epoch` is executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Train,
    Val,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Train => write!(f, "train"),
            Phase::Val => write!(f, "val"),
        }
    }
}

/// How progress is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    /// One plain line every `every` iterations.
    Lines { every: usize },
    /// A single line redrawn in place with `\r`.
    Bar,
}

impl Style {
    /// `PRINT_FREQ > 0` prints lines, anything else draws a bar.
    pub fn from_print_freq(print_freq: i64) -> Style {
        if print_freq > 0 {
            Style::Lines { every: print_freq as usize }
        } else {
            Style::Bar
        }
    }
}

const BAR_WIDTH: usize = 32;

/// Per-epoch progress reporter writing to a borrowed sink.
pub struct Progress<'a> {
    out: &'a mut (dyn Write + Send),
    label: String,
    phase: Phase,
    epoch: usize,
    total: usize,
    style: Style,
    hide_data_time: bool,
    started: Instant,
    drawn: bool,
}

impl<'a> Progress<'a> {
    pub fn new(
        out: &'a mut (dyn Write + Send),
        label: String,
        phase: Phase,
        epoch: usize,
        total: usize,
        style: Style,
        hide_data_time: bool,
    ) -> Progress<'a> {
        Progress { out, label, phase, epoch, total, style, hide_data_time, started: Instant::now(), drawn: false }
    }

    /// Status suffix shared by both styles, e.g.
    /// `train: [3][10/50]|Tot: 0:00:02 |ETA: 0:00:08 |loss 0.6931 |Data 0.001s(0.002s) |Net 0.040s`.
    pub fn suffix(
        &self,
        iter_id: usize,
        stats: &[(&str, &RunningStat)],
        data_time: &RunningStat,
        batch_time: &RunningStat,
    ) -> String {
        let elapsed = self.started.elapsed();
        let done = iter_id + 1;
        let eta = if done >= self.total {
            Duration::ZERO
        } else {
            elapsed.mul_f64((self.total - done) as f64 / done as f64)
        };

        let mut s = format!(
            "{}: [{}][{}/{}]|Tot: {} |ETA: {} ",
            self.phase,
            self.epoch,
            iter_id,
            self.total,
            format_clock(elapsed),
            format_clock(eta)
        );
        for (name, stat) in stats {
            s.push_str(&format!("|{} {:.4} ", name, stat.avg));
        }
        if !self.hide_data_time {
            s.push_str(&format!(
                "|Data {:.3}s({:.3}s) |Net {:.3}s",
                data_time.val, data_time.avg, batch_time.avg
            ));
        }
        s
    }

    pub fn update(
        &mut self,
        iter_id: usize,
        stats: &[(&str, &RunningStat)],
        data_time: &RunningStat,
        batch_time: &RunningStat,
    ) -> io::Result<()> {
        match self.style {
            Style::Lines { every } => {
                if iter_id % every == 0 {
                    let line = self.suffix(iter_id, stats, data_time, batch_time);
                    writeln!(self.out, "{}| {}", self.label, line)?;
                }
            }
            Style::Bar => {
                let line = self.suffix(iter_id, stats, data_time, batch_time);
                let bar = render_bar(iter_id + 1, self.total);
                write!(self.out, "\r{} |{}| {}", self.label, bar, line)?;
                self.drawn = true;
            }
        }
        self.out.flush()
    }

    /// Terminates a drawn bar with a newline.
    pub fn finish(&mut self) -> io::Result<()> {
        if self.drawn {
            writeln!(self.out)?;
            self.drawn = false;
        }
        self.out.flush()
    }
}

fn render_bar(current: usize, total: usize) -> String {
    let filled = if total == 0 {
        BAR_WIDTH
    } else {
        (current.min(total) * BAR_WIDTH) / total
    };
    let mut bar = "#".repeat(filled);
    bar.push_str(&" ".repeat(BAR_WIDTH - filled));
    bar
}

/// `h:mm:ss`, the way elapsed and remaining time appear in progress output.
pub fn format_clock(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat(val: f64) -> RunningStat {
        let mut s = RunningStat::new();
        s.update(val, 1);
        s
    }

    #[test]
    fn clock_format() {
        assert_eq!(format_clock(Duration::from_secs(0)), "0:00:00");
        assert_eq!(format_clock(Duration::from_secs(3725)), "1:02:05");
    }

    #[test]
    fn style_from_print_freq() {
        assert_eq!(Style::from_print_freq(5), Style::Lines { every: 5 });
        assert_eq!(Style::from_print_freq(0), Style::Bar);
        assert_eq!(Style::from_print_freq(-1), Style::Bar);
    }

    #[test]
    fn lines_print_every_nth_iteration() {
        let mut buf: Vec<u8> = Vec::new();
        let loss = stat(0.5);
        let t = stat(0.01);
        {
            let mut p = Progress::new(&mut buf, "cls/exp".into(), Phase::Train, 2, 5, Style::Lines { every: 2 }, false);
            for i in 0..5 {
                p.update(i, &[("loss", &loss)], &t, &t).unwrap();
            }
            p.finish().unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("cls/exp| train: [2][0/5]|Tot: "));
        assert!(lines[1].contains("[2][2/5]"));
        assert!(lines[2].contains("|loss 0.5000 "));
        assert!(lines[2].contains("|Data 0.010s(0.010s) |Net 0.010s"));
    }

    #[test]
    fn hidden_data_time_is_omitted() {
        let mut buf: Vec<u8> = Vec::new();
        let t = stat(0.2);
        let p = Progress::new(&mut buf, "a/b".into(), Phase::Val, 1, 3, Style::Bar, true);
        let s = p.suffix(0, &[("loss", &t)], &t, &t);
        assert!(s.starts_with("val: [1][0/3]"));
        assert!(!s.contains("Data"));
    }

    #[test]
    fn bar_redraws_in_place_and_ends_with_newline() {
        let mut buf: Vec<u8> = Vec::new();
        let t = stat(0.0);
        {
            let mut p = Progress::new(&mut buf, "a/b".into(), Phase::Train, 1, 2, Style::Bar, true);
            p.update(0, &[], &t, &t).unwrap();
            p.update(1, &[], &t, &t).unwrap();
            p.finish().unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.matches('\r').count(), 2);
        assert!(text.ends_with('\n'));
        assert!(text.contains(&format!("|{}|", "#".repeat(BAR_WIDTH))));
    }
}
