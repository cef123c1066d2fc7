// SPDX-License-Identifier: GPL-3.0-only

//! Terminal presentation surface
//!
//! Renders pixelated frames to the terminal using Unicode half-block
//! characters for improved vertical resolution. Each presented frame is
//! copied back from the GPU, which is fine for a debug display.

use crate::errors::{PipelineError, PipelineResult};
use crate::pipelines::{LivePipeline, PresentationSurface, PresentedFrame};

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use image::RgbaImage;
use ratatui::{
    Terminal, backend::CrosstermBackend, buffer::Buffer, layout::Rect, style::Color,
    widgets::Widget,
};
use std::io::{self, stdout};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

/// Small and large block-size steps bound to `-`/`+` and `[`/`]`
const FINE_STEP: i64 = 1;
const COARSE_STEP: i64 = 10;

/// Surface that keeps the last presented frame as a CPU image
#[derive(Default)]
pub struct TerminalSurface {
    frame: Option<RgbaImage>,
}

impl TerminalSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn image(&self) -> Option<&RgbaImage> {
        self.frame.as_ref()
    }
}

impl PresentationSurface for TerminalSurface {
    fn present(&mut self, frame: &PresentedFrame) -> PipelineResult<()> {
        let image = pollster::block_on(frame.read_rgba())
            .map_err(|e| PipelineError::Presentation(e.to_string()))?;
        self.frame = Some(image);
        Ok(())
    }
}

/// Run the interactive viewer until the user quits
pub fn run(pipeline: &LivePipeline, source_name: &str) -> Result<(), Box<dyn std::error::Error>> {
    // Set up terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, pipeline, source_name);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    pipeline: &LivePipeline,
    source_name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut surface = TerminalSurface::new();
    let mut show_help = false;
    let mut notice: Option<String> = None;

    loop {
        if let Err(e) = pipeline.present_latest(&mut surface) {
            error!(error = %e, "Failed to present frame");
            notice = Some(format!("Error: {}", e));
        }

        if !pipeline.is_running() {
            return Err("Live pipeline stopped".into());
        }

        let status_message = if show_help {
            build_help_message()
        } else if let Some(notice) = &notice {
            notice.clone()
        } else {
            build_status_message(pipeline, source_name)
        };

        terminal.draw(|f| {
            let area = f.area();

            // Reserve bottom line for status
            let frame_area = Rect {
                x: area.x,
                y: area.y,
                width: area.width,
                height: area.height.saturating_sub(1),
            };
            f.render_widget(FrameWidget { image: surface.image() }, frame_area);

            let status_area = Rect {
                x: area.x,
                y: area.height.saturating_sub(1),
                width: area.width,
                height: 1,
            };
            f.render_widget(
                StatusBar {
                    message: &status_message,
                },
                status_area,
            );
        })?;

        // Handle input with timeout for frame updates
        if event::poll(Duration::from_millis(16))?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            // Ctrl+C to quit
            if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
                break;
            }

            let step = match key.code {
                KeyCode::Char('+') | KeyCode::Char('=') => Some(FINE_STEP),
                KeyCode::Char('-') => Some(-FINE_STEP),
                KeyCode::Char(']') => Some(COARSE_STEP),
                KeyCode::Char('[') => Some(-COARSE_STEP),
                _ => None,
            };
            if let Some(step) = step {
                pipeline.parameter().adjust(step);
                notice = None;
            }

            match key.code {
                // 'p' to save a snapshot
                KeyCode::Char('p') => {
                    show_help = false;
                    if let Some(image) = surface.image() {
                        notice = Some(match save_snapshot(image) {
                            Ok(path) => format!("Saved: {}", path.display()),
                            Err(e) => {
                                error!("Failed to save snapshot: {}", e);
                                format!("Error: {}", e)
                            }
                        });
                    }
                }
                // 'h' to toggle help
                KeyCode::Char('h') => {
                    show_help = !show_help;
                    notice = None;
                }
                // 'q' also quits
                KeyCode::Char('q') => break,
                _ => {}
            }
        }
    }

    Ok(())
}

fn build_status_message(pipeline: &LivePipeline, source_name: &str) -> String {
    let stats = pipeline.stats();
    format!(
        "{} | block {} | shown {} dropped {} skipped {} | 'h' help | 'q' quit",
        source_name,
        pipeline.parameter().get(),
        stats.presented,
        stats.dropped,
        stats.skipped
    )
}

fn build_help_message() -> String {
    "+/-: Block size ±1 | ]/[: Block size ±10 | p: Save snapshot | h: Toggle help | q/Ctrl+C: Quit"
        .to_string()
}

/// Directory snapshots are written to
fn snapshot_directory() -> PathBuf {
    dirs::picture_dir()
        .map(|dir| dir.join("mosaic"))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Save the current frame as a PNG snapshot
fn save_snapshot(image: &RgbaImage) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let dir = snapshot_directory();
    std::fs::create_dir_all(&dir)?;

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let filepath = dir.join(format!("MOSAIC_{}.png", timestamp));

    image.save(&filepath)?;
    info!(path = %filepath.display(), "Snapshot saved");

    Ok(filepath)
}

/// Widget that renders an RGBA image using half-block characters
struct FrameWidget<'a> {
    image: Option<&'a RgbaImage>,
}

impl Widget for FrameWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let Some(image) = self.image else {
            // No frame yet - show placeholder
            let msg = "Waiting for frames...";
            let x = area.x + (area.width.saturating_sub(msg.len() as u16)) / 2;
            let y = area.y + area.height / 2;
            if y < area.y + area.height && x < area.x + area.width {
                buf.set_string(x, y, msg, ratatui::style::Style::default());
            }
            return;
        };

        let (display_width, display_height) =
            fit_dimensions(image.width(), image.height(), area.width, area.height);
        if display_width == 0 || display_height == 0 {
            return;
        }

        // Center the image
        let x_offset = area.x + (area.width.saturating_sub(display_width)) / 2;
        let y_offset = area.y + (area.height.saturating_sub(display_height)) / 2;

        let x_scale = image.width() as f64 / display_width as f64;
        let y_scale = image.height() as f64 / (display_height * 2) as f64;

        // Each cell shows two vertical pixels: upper half (▀) as fg, lower as bg
        for ty in 0..display_height {
            for tx in 0..display_width {
                let src_x = ((tx as f64 * x_scale) as u32).min(image.width() - 1);
                let src_y_top = ((ty as f64 * 2.0 * y_scale) as u32).min(image.height() - 1);
                let src_y_bottom =
                    (((ty as f64 * 2.0 + 1.0) * y_scale) as u32).min(image.height() - 1);

                if let Some(cell) = buf.cell_mut((x_offset + tx, y_offset + ty)) {
                    cell.set_char('▀');
                    cell.set_fg(sample_pixel(image, src_x, src_y_top));
                    cell.set_bg(sample_pixel(image, src_x, src_y_bottom));
                }
            }
        }
    }
}

/// Cells needed to show a `width` x `height` image inside `cols` x `rows`
/// while keeping its aspect ratio; every cell holds two pixel rows
fn fit_dimensions(width: u32, height: u32, cols: u16, rows: u16) -> (u16, u16) {
    if width == 0 || height == 0 {
        return (0, 0);
    }
    let aspect = width as f64 / height as f64;
    let term_width = cols as f64;
    let term_height = rows as f64 * 2.0;

    if term_width / term_height > aspect {
        // Terminal is wider - fit to height
        ((term_height * aspect) as u16, rows)
    } else {
        // Terminal is taller - fit to width
        (cols, (term_width / aspect / 2.0) as u16)
    }
}

fn sample_pixel(image: &RgbaImage, x: u32, y: u32) -> Color {
    let [r, g, b, _] = image.get_pixel(x, y).0;
    Color::Rgb(r, g, b)
}

/// Status bar widget
struct StatusBar<'a> {
    message: &'a str,
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        // Fill background
        for x in area.x..area.x + area.width {
            if let Some(cell) = buf.cell_mut((x, area.y)) {
                cell.set_char(' ');
                cell.set_bg(Color::DarkGray);
            }
        }

        let text: String = self.message.chars().take(area.width as usize).collect();
        buf.set_string(
            area.x,
            area.y,
            text,
            ratatui::style::Style::default()
                .fg(Color::White)
                .bg(Color::DarkGray),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_keeps_aspect() {
        // 4:3 image in a wide terminal fits to height
        assert_eq!(fit_dimensions(640, 480, 200, 30), (80, 30));
        // Same image in a narrow terminal fits to width
        assert_eq!(fit_dimensions(640, 480, 40, 100), (40, 15));
        assert_eq!(fit_dimensions(0, 480, 40, 100), (0, 0));
    }

    #[test]
    fn test_widget_renders_colors() {
        let image = RgbaImage::from_fn(4, 4, |_, y| {
            if y < 2 {
                image::Rgba([255, 0, 0, 255])
            } else {
                image::Rgba([0, 0, 255, 255])
            }
        });
        let area = Rect::new(0, 0, 4, 2);
        let mut buf = Buffer::empty(area);
        FrameWidget {
            image: Some(&image),
        }
        .render(area, &mut buf);

        let top = &buf[(0, 0)];
        assert_eq!(top.symbol(), "▀");
        assert_eq!(top.fg, Color::Rgb(255, 0, 0));
        assert_eq!(top.bg, Color::Rgb(255, 0, 0));
        let bottom = &buf[(0, 1)];
        assert_eq!(bottom.fg, Color::Rgb(0, 0, 255));
    }
}
