//! SVG rendering for training curves and projection scatter plots.
//!
//! Charts are assembled as plain SVG strings; no drawing library is
//! involved, which keeps artifacts reproducible byte for byte. Rendering
//! never fails: degenerate inputs (empty series, a single point) produce a
//! chart with axes and no marks.

use crate::projection::Projection;

/// Ten-color categorical palette for class and series coloring.
pub const PALETTE: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

const CHART_WIDTH: usize = 720;
const CHART_HEIGHT: usize = 480;
const MARGIN: usize = 60;

/// Color for class or series index `i`, cycling through the palette.
#[must_use]
pub fn palette_color(i: usize) -> &'static str {
    PALETTE[i % PALETTE.len()]
}

/// A line chart of per-epoch scalar series sharing one y-axis.
#[derive(Debug, Clone)]
pub struct CurveChart {
    title: String,
    y_label: String,
    series: Vec<(String, Vec<f64>)>,
}

impl CurveChart {
    /// Creates an empty chart.
    #[must_use]
    pub fn new(title: impl Into<String>, y_label: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            y_label: y_label.into(),
            series: Vec::new(),
        }
    }

    /// Adds one named series; x is the 1-indexed epoch.
    #[must_use]
    pub fn series(mut self, label: impl Into<String>, values: &[f64]) -> Self {
        self.series.push((label.into(), values.to_vec()));
        self
    }

    /// Renders the chart as an SVG document.
    #[must_use]
    pub fn render_svg(&self) -> String {
        let width = CHART_WIDTH;
        let height = CHART_HEIGHT;
        let plot_w = width - 2 * MARGIN;
        let plot_h = height - 2 * MARGIN;

        let mut svg = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {width} {height}">"#
        );
        svg.push_str(&format!(
            "<rect width=\"{width}\" height=\"{height}\" fill=\"#fafafa\"/>"
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="28" text-anchor="middle" font-size="16" font-weight="bold">{}</text>"#,
            width / 2,
            self.title
        ));

        // Axes.
        svg.push_str(&format!(
            "<line x1=\"{m}\" y1=\"{b}\" x2=\"{r}\" y2=\"{b}\" stroke=\"#333\" stroke-width=\"1\"/>",
            m = MARGIN,
            b = height - MARGIN,
            r = width - MARGIN
        ));
        svg.push_str(&format!(
            "<line x1=\"{m}\" y1=\"{m}\" x2=\"{m}\" y2=\"{b}\" stroke=\"#333\" stroke-width=\"1\"/>",
            m = MARGIN,
            b = height - MARGIN
        ));
        svg.push_str(&format!(
            r#"<text x="18" y="{}" font-size="12" transform="rotate(-90 18 {})" text-anchor="middle">{}</text>"#,
            height / 2,
            height / 2,
            self.y_label
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" font-size="12" text-anchor="middle">epoch</text>"#,
            width / 2,
            height - 18
        ));

        let max_len = self.series.iter().map(|(_, v)| v.len()).max().unwrap_or(0);
        let (y_min, y_max) = self.y_bounds();

        if max_len > 0 && y_max > y_min {
            // Y-axis tick labels at the extremes.
            svg.push_str(&format!(
                r#"<text x="{x}" y="{y}" font-size="10" text-anchor="end">{v:.3}</text>"#,
                x = MARGIN - 6,
                y = MARGIN + 4,
                v = y_max
            ));
            svg.push_str(&format!(
                r#"<text x="{x}" y="{y}" font-size="10" text-anchor="end">{v:.3}</text>"#,
                x = MARGIN - 6,
                y = height - MARGIN + 4,
                v = y_min
            ));

            for (i, (label, values)) in self.series.iter().enumerate() {
                if values.is_empty() {
                    continue;
                }
                let color = palette_color(i);
                let points: Vec<String> = values
                    .iter()
                    .enumerate()
                    .map(|(e, &v)| {
                        let x = MARGIN as f64
                            + if max_len > 1 {
                                e as f64 / (max_len - 1) as f64 * plot_w as f64
                            } else {
                                plot_w as f64 / 2.0
                            };
                        let y = (height - MARGIN) as f64
                            - (v - y_min) / (y_max - y_min) * plot_h as f64;
                        format!("{x:.1},{y:.1}")
                    })
                    .collect();
                svg.push_str(&format!(
                    "<polyline points=\"{}\" fill=\"none\" stroke=\"{color}\" stroke-width=\"2\"/>",
                    points.join(" ")
                ));

                // Legend entry.
                let ly = MARGIN + 16 * i;
                svg.push_str(&format!(
                    "<line x1=\"{x}\" y1=\"{ly}\" x2=\"{x2}\" y2=\"{ly}\" stroke=\"{color}\" stroke-width=\"2\"/>",
                    x = width - MARGIN - 110,
                    x2 = width - MARGIN - 86,
                ));
                svg.push_str(&format!(
                    r#"<text x="{x}" y="{y}" font-size="11">{label}</text>"#,
                    x = width - MARGIN - 80,
                    y = ly + 4,
                ));
            }
        }

        svg.push_str("</svg>");
        svg
    }

    fn y_bounds(&self) -> (f64, f64) {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for (_, values) in &self.series {
            for &v in values {
                min = min.min(v);
                max = max.max(v);
            }
        }
        if !min.is_finite() || !max.is_finite() {
            (0.0, 0.0)
        } else {
            (min, max)
        }
    }
}

/// Renders a labeled 2-D projection as a colored scatter plot.
#[must_use]
pub fn render_scatter(title: &str, projection: &Projection) -> String {
    let width = CHART_WIDTH;
    let height = CHART_HEIGHT;
    let plot_w = (width - 2 * MARGIN) as f64;
    let plot_h = (height - 2 * MARGIN) as f64;

    let mut svg =
        format!(r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {width} {height}">"#);
    svg.push_str(&format!(
        "<rect width=\"{width}\" height=\"{height}\" fill=\"#fafafa\"/>"
    ));
    svg.push_str(&format!(
        r#"<text x="{}" y="28" text-anchor="middle" font-size="16" font-weight="bold">{title}</text>"#,
        width / 2
    ));

    if !projection.points.is_empty() {
        let mut x_min = f64::INFINITY;
        let mut x_max = f64::NEG_INFINITY;
        let mut y_min = f64::INFINITY;
        let mut y_max = f64::NEG_INFINITY;
        for p in &projection.points {
            x_min = x_min.min(p[0]);
            x_max = x_max.max(p[0]);
            y_min = y_min.min(p[1]);
            y_max = y_max.max(p[1]);
        }
        let x_span = (x_max - x_min).max(f64::MIN_POSITIVE);
        let y_span = (y_max - y_min).max(f64::MIN_POSITIVE);

        for (point, &label) in projection.points.iter().zip(projection.labels.iter()) {
            let x = MARGIN as f64 + (point[0] - x_min) / x_span * plot_w;
            // SVG y grows downward.
            let y = MARGIN as f64 + (y_max - point[1]) / y_span * plot_h;
            svg.push_str(&format!(
                "<circle cx=\"{x:.1}\" cy=\"{y:.1}\" r=\"3\" fill=\"{}\" fill-opacity=\"0.7\"/>",
                palette_color(label)
            ));
        }
    }

    svg.push_str("</svg>");
    svg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_curve_chart_contains_every_series() {
        let svg = CurveChart::new("loss", "loss")
            .series("train", &[2.0, 1.5, 1.2])
            .series("val", &[2.1, 1.7, 1.4])
            .render_svg();
        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert!(svg.contains(">train</text>"));
        assert!(svg.contains(">val</text>"));
        assert_eq!(svg.matches("<polyline").count(), 2);
    }

    #[test]
    fn test_empty_chart_still_renders_axes() {
        let svg = CurveChart::new("empty", "y").render_svg();
        assert!(svg.contains("<line"));
        assert!(!svg.contains("<polyline"));
    }

    #[test]
    fn test_scatter_colors_by_label() {
        let projection = Projection {
            points: vec![[0.0, 0.0], [1.0, 1.0], [2.0, 0.5]],
            labels: vec![0, 1, 0],
        };
        let svg = render_scatter("tsne", &projection);
        assert_eq!(svg.matches("<circle").count(), 3);
        assert_eq!(svg.matches(PALETTE[0]).count(), 2);
        assert_eq!(svg.matches(PALETTE[1]).count(), 1);
    }

    #[test]
    fn test_palette_cycles() {
        assert_eq!(palette_color(0), palette_color(10));
    }
}
