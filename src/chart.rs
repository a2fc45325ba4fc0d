//! SVG rendering of a run report.

use crate::analysis::Report;
use anyhow::{Context, Result};
use std::{fmt::Write, fs, path::Path};

const WIDTH: f64 = 1000.0;
const HEIGHT: f64 = 500.0;
const MARGIN_LEFT: f64 = 80.0;
const MARGIN_RIGHT: f64 = 30.0;
const MARGIN_TOP: f64 = 50.0;
const MARGIN_BOTTOM: f64 = 60.0;
const N_TICKS: usize = 5;

/// Maps data coordinates onto the plot area.
struct Frame {
    x_max: f64,
    y_max: f64,
}

impl Frame {
    fn x(&self, t: f64) -> f64 {
        MARGIN_LEFT + t / self.x_max * (WIDTH - MARGIN_LEFT - MARGIN_RIGHT)
    }

    fn y(&self, v: f64) -> f64 {
        HEIGHT - MARGIN_BOTTOM - v / self.y_max * (HEIGHT - MARGIN_TOP - MARGIN_BOTTOM)
    }

    fn points(&self, timestamps: &[f64], vals: &[f64]) -> String {
        let points: Vec<_> = timestamps
            .iter()
            .zip(vals)
            .map(|(&t, &v)| format!("{:.2},{:.2}", self.x(t), self.y(v)))
            .collect();
        points.join(" ")
    }
}

/// Render the raw and smoothed curves of `report` with the peak marked.
pub fn render_svg(report: &Report) -> Result<String, std::fmt::Error> {
    let unit = report.metric.unit();
    let label = report.metric.label();
    let stats = &report.trend.stats;
    let timestamps: Vec<_> = report.series.timestamps().collect();
    let vals: Vec<_> = report.series.values().collect();

    let x_max = timestamps.last().copied().unwrap_or(0.0).max(report.elapsed);
    let frame = Frame {
        x_max: if x_max > 0.0 { x_max } else { 1.0 },
        y_max: if stats.peak_value > 0.0 {
            stats.peak_value * 1.15
        } else {
            1.0
        },
    };

    let mut svg = String::new();
    write_svg(&mut svg, report, &frame, &timestamps, &vals, label, unit)?;
    Ok(svg)
}

fn write_svg(
    svg: &mut String,
    report: &Report,
    frame: &Frame,
    timestamps: &[f64],
    vals: &[f64],
    label: &str,
    unit: &str,
) -> std::fmt::Result {
    let stats = &report.trend.stats;
    let left = MARGIN_LEFT;
    let right = WIDTH - MARGIN_RIGHT;
    let top = MARGIN_TOP;
    let bottom = HEIGHT - MARGIN_BOTTOM;

    writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{HEIGHT}" viewBox="0 0 {WIDTH} {HEIGHT}" font-family="Arial, sans-serif" font-size="12">"#
    )?;
    writeln!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#)?;
    writeln!(
        svg,
        r#"<text x="{}" y="30" text-anchor="middle" font-size="16">{} of {}</text>"#,
        WIDTH / 2.0,
        label,
        escape(&report.target)
    )?;

    // Grid and ticks.
    for i in 0..=N_TICKS {
        let frac = i as f64 / N_TICKS as f64;

        let t = frac * frame.x_max;
        let x = frame.x(t);
        writeln!(
            svg,
            r##"<line x1="{x:.2}" y1="{top}" x2="{x:.2}" y2="{bottom}" stroke="#dddddd"/>"##
        )?;
        writeln!(
            svg,
            r#"<text x="{x:.2}" y="{}" text-anchor="middle">{t:.1}</text>"#,
            bottom + 18.0
        )?;

        let v = frac * frame.y_max;
        let y = frame.y(v);
        writeln!(
            svg,
            r##"<line x1="{left}" y1="{y:.2}" x2="{right}" y2="{y:.2}" stroke="#dddddd"/>"##
        )?;
        writeln!(
            svg,
            r#"<text x="{}" y="{:.2}" text-anchor="end">{v:.1}</text>"#,
            left - 8.0,
            y + 4.0
        )?;
    }
    writeln!(
        svg,
        r#"<rect x="{left}" y="{top}" width="{}" height="{}" fill="none" stroke="black"/>"#,
        right - left,
        bottom - top
    )?;

    // Axis titles.
    writeln!(
        svg,
        r#"<text x="{}" y="{}" text-anchor="middle">Elapsed time (s)</text>"#,
        (left + right) / 2.0,
        HEIGHT - 15.0
    )?;
    let y_mid = (top + bottom) / 2.0;
    writeln!(
        svg,
        r#"<text x="20" y="{y_mid}" text-anchor="middle" transform="rotate(-90 20 {y_mid})">{label} ({unit})</text>"#
    )?;

    // Curves.
    writeln!(
        svg,
        r#"<polyline points="{}" fill="none" stroke="blue" stroke-opacity="0.5" stroke-dasharray="2 3"/>"#,
        frame.points(timestamps, vals)
    )?;
    writeln!(
        svg,
        r#"<polyline points="{}" fill="none" stroke="darkblue" stroke-width="2"/>"#,
        frame.points(timestamps, &report.trend.smoothed)
    )?;

    // Peak.
    let peak_x = frame.x(stats.peak_timestamp);
    let peak_y = frame.y(stats.peak_value);
    writeln!(
        svg,
        r#"<circle cx="{peak_x:.2}" cy="{peak_y:.2}" r="4" fill="red"/>"#
    )?;
    writeln!(
        svg,
        r#"<text x="{:.2}" y="{:.2}" fill="red">Peak: {:.2} {unit}</text>"#,
        peak_x + 6.0,
        peak_y - 8.0,
        stats.peak_value
    )?;

    // Legend.
    let legend_x = right - 230.0;
    writeln!(
        svg,
        r#"<line x1="{legend_x}" y1="{}" x2="{}" y2="{}" stroke="blue" stroke-opacity="0.5" stroke-dasharray="2 3"/>"#,
        top + 20.0,
        legend_x + 30.0,
        top + 20.0
    )?;
    writeln!(
        svg,
        r#"<text x="{}" y="{}">{label} (raw values)</text>"#,
        legend_x + 38.0,
        top + 24.0
    )?;
    writeln!(
        svg,
        r#"<line x1="{legend_x}" y1="{}" x2="{}" y2="{}" stroke="darkblue" stroke-width="2"/>"#,
        top + 40.0,
        legend_x + 30.0,
        top + 40.0
    )?;
    writeln!(
        svg,
        r#"<text x="{}" y="{}">{label} (EWMA)</text>"#,
        legend_x + 38.0,
        top + 44.0
    )?;

    writeln!(svg, "</svg>")
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Render `report` and write it to an SVG file.
pub fn save_chart<P: AsRef<Path>>(report: &Report, file: P) -> Result<()> {
    let file = file.as_ref();
    let svg = render_svg(report).context("failed to render chart")?;
    fs::write(file, svg).with_context(|| format!("failed to write {file:?}"))?;
    Ok(())
}
