use crate::error::TopologyError;
use crate::legend::{self, Legend};
use crate::path;
use crate::processing::{join_counties, CountyShape, JoinStats, RecordIndex};
use crate::scale::{LinearScale, ThresholdScale};
use crate::tooltip;
use crate::topology::{self, STATES};
use crate::types::MapViewModel;
use std::collections::BTreeMap;
use std::fmt::Write;
use tracing::info;

pub const WIDTH: u32 = 960;
pub const HEIGHT: u32 = 600;
pub const TITLE: &str = "United States Educational Attainment";
pub const DESCRIPTION: &str =
    "Percentage of adults age 25 and older with a bachelor's degree or higher (2010-2014)";

/// Output of one render pass. Rebuilt from scratch for every model.
#[derive(Debug, Clone)]
pub struct DrawCommands {
    pub counties: Vec<CountyShape>,
    /// Path data for the borders shared between states.
    pub states: String,
    pub legend: Legend,
    pub stats: JoinStats,
    /// The index the counties were joined against; hover lookups reuse it.
    pub index: RecordIndex,
}

pub fn render(model: &MapViewModel) -> Result<DrawCommands, TopologyError> {
    model.topology.validate()?;
    let scale = ThresholdScale::education();
    let index = RecordIndex::build(&model.records);

    let counties = topology::counties(&model.topology)?;
    let (counties, stats) = join_counties(counties, &index, &scale);

    let mesh = topology::interior_mesh(&model.topology, STATES)?;
    info!("State outline has {} shared arcs", mesh.0.len());

    Ok(DrawCommands {
        counties,
        states: path::lines(&mesh),
        legend: Legend::build(&scale, &LinearScale::legend()),
        stats,
        index,
    })
}

impl DrawCommands {
    pub fn to_svg(&self) -> String {
        let mut out = String::with_capacity(64 * 1024 + self.counties.len() * 512);
        let _ = writeln!(
            out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{HEIGHT}" viewBox="0 0 {WIDTH} {HEIGHT}">"#
        );
        self.write_legend(&mut out);

        out.push_str("<g class=\"counties\">\n");
        for county in &self.counties {
            out.push_str("<path class=\"county\"");
            if let Some(fips) = county.fips {
                let _ = write!(out, " data-fips=\"{fips}\"");
            }
            if let Some(value) = county.value {
                let _ = write!(out, " data-education=\"{value}\"");
            }
            if let Some(fill) = county.fill {
                let _ = write!(out, " fill=\"{fill}\"");
            }
            let _ = writeln!(out, " d=\"{}\"/>", county.path);
        }
        out.push_str("</g>\n");

        let _ = writeln!(
            out,
            r##"<path class="states" fill="none" stroke="#fff" stroke-linejoin="round" d="{}"/>"##,
            self.states
        );
        out.push_str("</svg>\n");
        out
    }

    fn write_legend(&self, out: &mut String) {
        let l = &self.legend;
        let _ = writeln!(
            out,
            r#"<g class="key" id="legend" transform="translate(0,{})">"#,
            legend::OFFSET_Y
        );
        for entry in &l.entries {
            let _ = writeln!(
                out,
                r#"<rect height="{}" x="{}" width="{}" fill="{}"/>"#,
                legend::BAR_HEIGHT,
                entry.x,
                entry.width,
                entry.color
            );
        }
        for tick in &l.ticks {
            let _ = writeln!(
                out,
                r##"<g class="tick" transform="translate({},0)"><line stroke="#000" y2="{}"/><text fill="#000" x="8" y="16" dy="0.71em">{}</text></g>"##,
                tick.x,
                legend::TICK_SIZE,
                xml_escape(&tick.label)
            );
        }
        let _ = writeln!(
            out,
            r##"<text class="legend-caption" x="{}" y="-6" fill="#000" text-anchor="start" font-weight="bold">{}</text>"##,
            l.caption_x,
            xml_escape(l.caption)
        );
        out.push_str("</g>\n");
    }

    /// Tooltip text per fips, as consumed by the page script.
    pub fn tooltip_table(&self) -> BTreeMap<String, String> {
        self.counties
            .iter()
            .filter_map(|c| Some((c.fips?.to_string(), c.tooltip.clone()?)))
            .collect()
    }

    pub fn to_html(&self) -> String {
        let table = serde_json::to_string(&self.tooltip_table())
            .unwrap_or_else(|_| "{}".to_string())
            .replace("</", "<\\/");
        let script = HOVER_SCRIPT
            .replace("__OFFSET_X__", &tooltip::OFFSET_X.to_string())
            .replace("__OFFSET_Y__", &tooltip::OFFSET_Y.to_string())
            .replace("__OPACITY__", &tooltip::VISIBLE_OPACITY.to_string());

        let mut body = String::new();
        let _ = writeln!(body, r#"<div id="title">{}</div>"#, xml_escape(TITLE));
        let _ = writeln!(body, r#"<div id="description">{}</div>"#, xml_escape(DESCRIPTION));
        let _ = writeln!(body, r#"<div id="chart">"#);
        body.push_str(&self.to_svg());
        body.push_str("<div class=\"tooltip\" id=\"tooltip\" style=\"opacity: 0\"></div>\n</div>\n");
        let _ = writeln!(
            body,
            r#"<script id="tooltip-data" type="application/json">{table}</script>"#
        );
        let _ = writeln!(body, "<script>{script}</script>");
        page(TITLE, &body)
    }
}

/// The visible failure state shown instead of a map when loading failed.
pub fn render_error_page(message: &str) -> String {
    let mut body = String::new();
    let _ = writeln!(body, r#"<div id="title">{}</div>"#, xml_escape(TITLE));
    let _ = writeln!(
        body,
        r#"<div class="error-banner" role="alert"><p>The map data could not be loaded.</p><pre>{}</pre><button id="retry" type="button">Retry</button></div>"#,
        xml_escape(message)
    );
    body.push_str(
        "<script>document.getElementById('retry').addEventListener('click', () => {\n  fetch('/api/reload', { method: 'POST' }).finally(() => window.location.reload());\n});</script>\n",
    );
    page(TITLE, &body)
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n<style>{}</style>\n</head>\n<body>\n<div class=\"main\"><div class=\"chart-container\">\n{}</div></div>\n</body>\n</html>\n",
        xml_escape(title),
        STYLE,
        body
    )
}

const STYLE: &str = "body{font-family:sans-serif;background:#f4f4f4}\
.chart-container{width:960px;margin:20px auto;background:#fff;padding:20px}\
#title{font-size:2em;text-align:center}#description{text-align:center;margin:8px 0}\
.county:hover{stroke:#000;stroke-width:0.5}\
.tooltip{position:absolute;pointer-events:none;background:#fff;border:1px solid #999;padding:4px 8px;font-size:12px}\
.error-banner{border:1px solid #c33;background:#fee;padding:12px;margin-top:16px}";

const HOVER_SCRIPT: &str = r#"
const tips = JSON.parse(document.getElementById('tooltip-data').textContent);
const tooltip = document.getElementById('tooltip');
document.querySelectorAll('path.county').forEach((el) => {
  el.addEventListener('mouseover', (e) => {
    tooltip.style.opacity = __OPACITY__;
    tooltip.textContent = tips[el.dataset.fips] || '';
    tooltip.style.left = (e.pageX + __OFFSET_X__) + 'px';
    tooltip.style.top = (e.pageY + __OFFSET_Y__) + 'px';
  });
  el.addEventListener('mouseout', () => {
    tooltip.style.opacity = 0;
  });
});
"#;

/// Escape the five XML special characters.
pub fn xml_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}
