//! Live run status display.
//!
//! The acquisition runs on a worker thread and reports buffer completions
//! over a channel; the UI thread ticks, drains the channel, redraws and
//! watches for a quit key. Quitting does not cancel a capture in flight
//! (the vendor call has no cancellation), it stops the display and lets
//! the worker finish.

use crate::ats9462::AcqSettings;
use crate::controller::AcquisitionController;
use anyhow::Result;
use crossbeam_channel::{tick, Receiver, Sender};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::Stylize,
    symbols::border,
    text::{Line, Text},
    widgets::{Block, Paragraph, Widget},
    DefaultTerminal, Frame,
};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Throughput tracker with all-time totals and a 1 s sliding window.
#[derive(Debug)]
pub struct Counter {
    pub total_size: usize,
    pub n_buffers: usize,
    pub t_begin: Instant,
    window: Duration,
    events: VecDeque<(Instant, usize)>,
    bytes_in_window: usize,
}

impl Default for Counter {
    fn default() -> Self {
        Counter {
            total_size: 0,
            n_buffers: 0,
            t_begin: Instant::now(),
            window: Duration::from_secs(1),
            events: VecDeque::new(),
            bytes_in_window: 0,
        }
    }
}

impl Counter {
    pub fn new() -> Self {
        Default::default()
    }

    /// Long-term average rate since t_begin, in MB/s.
    pub fn average_rate(&self) -> f64 {
        let secs = self.t_begin.elapsed().as_secs_f64().max(1e-6);
        (self.total_size as f64 / secs) / (1024.0 * 1024.0)
    }

    /// Sliding-window rate over the last second, in MB/s.
    pub fn rate(&self) -> f64 {
        let secs = self.window.as_secs_f64().max(1e-6);
        (self.bytes_in_window as f64 / secs) / (1024.0 * 1024.0)
    }

    /// Record a completed buffer of `size` bytes.
    pub fn increment(&mut self, size: usize) {
        let now = Instant::now();
        self.total_size += size;
        self.n_buffers += 1;

        self.events.push_back((now, size));
        self.bytes_in_window += size;
        while let Some(&(ts, sz)) = self.events.front() {
            if now.duration_since(ts) > self.window {
                self.events.pop_front();
                self.bytes_in_window -= sz;
            } else {
                break;
            }
        }
    }

    pub fn reset(&mut self) {
        self.total_size = 0;
        self.n_buffers = 0;
        self.t_begin = Instant::now();
        self.events.clear();
        self.bytes_in_window = 0;
    }
}

/// Events the acquisition worker reports to the display.
#[derive(Debug, Clone, Copy)]
pub enum RunEvent {
    Buffer { bytes: usize },
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusExit {
    Quit,
    Finished,
}

/// Wraps a controller so every handled buffer is reported to the UI.
pub struct ProgressController<C> {
    inner: C,
    tx: Sender<RunEvent>,
}

impl<C> ProgressController<C> {
    pub fn new(inner: C, tx: Sender<RunEvent>) -> Self {
        Self { inner, tx }
    }
}

impl<C: AcquisitionController> AcquisitionController for ProgressController<C> {
    type Output = C::Output;

    fn pre_start_capture(
        &mut self,
        board: &crate::ats9462::BoardSettings,
        acq: &AcqSettings,
        info: &crate::ats::BoardInfo,
    ) -> Result<(), crate::error::DriverError> {
        self.inner.pre_start_capture(board, acq, info)
    }

    fn pre_acquire(&mut self) {
        self.inner.pre_acquire();
    }

    fn handle_buffer(&mut self, samples: &[u16]) {
        let _ = self.tx.send(RunEvent::Buffer {
            bytes: samples.len() * std::mem::size_of::<u16>(),
        });
        self.inner.handle_buffer(samples);
    }

    fn post_acquire(&mut self) -> Result<Self::Output, crate::error::DriverError> {
        self.inner.post_acquire()
    }
}

#[derive(Debug)]
pub struct Status {
    pub counter: Counter,
    pub buffers_done: usize,
    pub buffers_total: usize,
    pub camp_num: usize,
    pub run_num: usize,
    exit: Option<StatusExit>,
}

impl Status {
    pub fn new(camp_num: usize, run_num: usize, buffers_total: usize) -> Self {
        Self {
            counter: Counter::new(),
            buffers_done: 0,
            buffers_total,
            camp_num,
            run_num,
            exit: None,
        }
    }

    pub fn run(
        &mut self,
        terminal: &mut DefaultTerminal,
        rx: Receiver<RunEvent>,
    ) -> Result<StatusExit> {
        let ticker = tick(Duration::from_millis(200));
        loop {
            let _ = ticker.recv();

            while let Ok(event) = rx.try_recv() {
                match event {
                    RunEvent::Buffer { bytes } => {
                        self.counter.increment(bytes);
                        self.buffers_done += 1;
                    }
                    RunEvent::Finished => self.exit = Some(StatusExit::Finished),
                }
            }

            self.handle_events()?;
            terminal.draw(|f| self.draw(f))?;

            if let Some(exit) = self.exit {
                return Ok(exit);
            }
        }
    }

    fn draw(&self, frame: &mut Frame) {
        frame.render_widget(self, frame.area());
    }

    fn handle_events(&mut self) -> Result<()> {
        if event::poll(Duration::ZERO)? {
            match event::read()? {
                Event::Key(key_event) if key_event.kind == KeyEventKind::Press => {
                    self.handle_key_event(key_event)
                }
                _ => {}
            };
        }
        Ok(())
    }

    fn handle_key_event(&mut self, key_event: KeyEvent) {
        if key_event.code == KeyCode::Char('q') {
            self.exit = Some(StatusExit::Quit);
        }
    }
}

impl Widget for &Status {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let title =
            Line::from(format!(" Campaign {} Run {} Status ", self.camp_num, self.run_num).bold());
        let instructions = Line::from(vec![" Quit ".into(), "<Q> ".blue().bold()]);
        let block = Block::bordered()
            .title(title.centered())
            .title_bottom(instructions.centered())
            .border_set(border::THICK);

        let status_text = Text::from(vec![Line::from(vec![
            "Elapsed time: ".into(),
            self.counter
                .t_begin
                .elapsed()
                .as_secs()
                .to_string()
                .yellow(),
            " s".into(),
            " Buffers: ".into(),
            format!("{}/{}", self.buffers_done, self.buffers_total).yellow(),
            " Data rate: ".into(),
            format!("{:.2}", self.counter.rate()).yellow(),
            " MB/s ".into(),
        ])]);

        Paragraph::new(status_text)
            .centered()
            .block(block)
            .render(area, buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_tracks_totals_and_window() {
        let mut counter = Counter::new();
        counter.increment(1024);
        counter.increment(2048);
        assert_eq!(counter.n_buffers, 2);
        assert_eq!(counter.total_size, 3072);
        assert!(counter.rate() > 0.0);
        counter.reset();
        assert_eq!(counter.total_size, 0);
    }

    #[test]
    fn progress_controller_reports_buffer_bytes() {
        use crate::vna::AverageController;

        let (tx, rx) = crossbeam_channel::unbounded();
        let mut controller = ProgressController::new(AverageController::new(256), tx);
        controller.handle_buffer(&[0u16; 64]);
        match rx.try_recv().unwrap() {
            RunEvent::Buffer { bytes } => assert_eq!(bytes, 128),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
