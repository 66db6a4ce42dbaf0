//! Markdown report renderer
//!
//! Lays a deliverable out into fixed-size pages and writes it as a Markdown
//! document into the reports directory:
//! - page 1 opens with the title, executive summary and recommendations
//! - one table block per table, columns apportioned evenly across the page width
//! - one bar-chart block per chart, one bar per label/value pair
//!
//! Tables and charts taller than a page are split row by row (bar by bar)
//! into continuation blocks that repeat the caption and header. Bars keep the
//! scale of the whole chart. Paragraphs are never split.

use crate::orchestrator::error::OrchestrationError;
use crate::orchestrator::renderer::Renderer;
use crate::orchestrator::types::{ArtifactRef, Chart, SynthesizedDeliverable, Table};
use crate::services::files::FileService;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// Usable page width in characters
pub const PAGE_WIDTH: usize = 96;

/// Lines per page before a page break
pub const PAGE_HEIGHT: usize = 60;

/// Longest bar in a chart, in characters
pub const MAX_BAR_LENGTH: usize = 40;

/// Lines a table takes besides its rows (caption, header, separator, spacing)
const TABLE_OVERHEAD: usize = 4;

/// Lines a chart takes besides its bars (caption, fences, spacing)
const CHART_OVERHEAD: usize = 5;

/// A laid-out table
#[derive(Debug, Clone, PartialEq)]
pub struct TableBlock {
    /// Table caption
    pub title: String,
    /// Header cells
    pub header: Vec<String>,
    /// Body rows
    pub rows: Vec<Vec<String>>,
    /// Width of each column in characters
    pub column_widths: Vec<usize>,
    /// Whether this block continues a table from the previous page
    pub continued: bool,
}

impl TableBlock {
    fn from_table(table: &Table) -> Self {
        let columns = table.columns.len().max(1);
        let width = (PAGE_WIDTH / columns).max(1);
        Self {
            title: table.title.clone(),
            header: table.columns.clone(),
            rows: table.rows.clone(),
            column_widths: vec![width; table.columns.len()],
            continued: false,
        }
    }

    fn split(self) -> Vec<Block> {
        let per_page = PAGE_HEIGHT - TABLE_OVERHEAD;
        if self.rows.len() <= per_page {
            return vec![Block::Table(self)];
        }
        self.rows
            .chunks(per_page)
            .enumerate()
            .map(|(i, rows)| {
                Block::Table(TableBlock {
                    title: self.title.clone(),
                    header: self.header.clone(),
                    rows: rows.to_vec(),
                    column_widths: self.column_widths.clone(),
                    continued: i > 0,
                })
            })
            .collect()
    }

    /// Number of rendered columns
    pub fn column_count(&self) -> usize {
        self.column_widths.len()
    }
}

/// One bar of a chart
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    /// Category label
    pub label: String,
    /// Plotted value
    pub value: f64,
    /// Bar length in characters, scaled to the largest value
    pub length: usize,
}

/// A laid-out bar chart
#[derive(Debug, Clone, PartialEq)]
pub struct ChartBlock {
    /// Chart caption
    pub title: String,
    /// One bar per label/value pair
    pub bars: Vec<Bar>,
    /// Whether this block continues a chart from the previous page
    pub continued: bool,
}

impl ChartBlock {
    fn from_chart(chart: &Chart) -> Self {
        let max = chart
            .values
            .iter()
            .map(|v| v.abs())
            .fold(0.0_f64, f64::max);
        let bars = chart
            .labels
            .iter()
            .zip(&chart.values)
            .map(|(label, value)| Bar {
                label: label.clone(),
                value: *value,
                length: if max > 0.0 {
                    ((value.abs() / max) * MAX_BAR_LENGTH as f64).round() as usize
                } else {
                    0
                },
            })
            .collect();
        Self {
            title: chart.title.clone(),
            bars,
            continued: false,
        }
    }

    fn split(self) -> Vec<Block> {
        let per_page = PAGE_HEIGHT - CHART_OVERHEAD;
        if self.bars.len() <= per_page {
            return vec![Block::Chart(self)];
        }
        self.bars
            .chunks(per_page)
            .enumerate()
            .map(|(i, bars)| {
                Block::Chart(ChartBlock {
                    title: self.title.clone(),
                    bars: bars.to_vec(),
                    continued: i > 0,
                })
            })
            .collect()
    }
}

/// A unit of page content
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    /// Document title and request line
    Title {
        /// Request the report answers
        query: String,
        /// Generation timestamp
        generated_at: DateTime<Utc>,
    },
    /// Section heading
    Heading(String),
    /// Body text
    Paragraph(String),
    /// Bulleted list
    Bullets(Vec<String>),
    /// Table
    Table(TableBlock),
    /// Bar chart
    Chart(ChartBlock),
}

impl Block {
    /// Estimated rendered height in lines
    fn height(&self) -> usize {
        match self {
            Block::Title { .. } => 4,
            Block::Heading(_) => 2,
            Block::Paragraph(text) => text.len() / PAGE_WIDTH + 2,
            Block::Bullets(items) => items.len() + 1,
            Block::Table(table) => table.rows.len() + TABLE_OVERHEAD,
            Block::Chart(chart) => chart.bars.len() + CHART_OVERHEAD,
        }
    }

    /// Pieces that each fit on one page
    fn split_to_fit(self) -> Vec<Block> {
        match self {
            Block::Table(table) => table.split(),
            Block::Chart(chart) => chart.split(),
            other => vec![other],
        }
    }
}

/// One page of the report
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    /// Blocks in display order
    pub blocks: Vec<Block>,
}

/// A deliverable laid out into pages
#[derive(Debug, Clone, PartialEq)]
pub struct ReportLayout {
    /// Pages in order; never empty
    pub pages: Vec<Page>,
}

impl ReportLayout {
    /// Lay out `deliverable` for `query`
    pub fn build(
        deliverable: &SynthesizedDeliverable,
        query: &str,
        generated_at: DateTime<Utc>,
    ) -> Self {
        let mut blocks = vec![
            Block::Title {
                query: query.to_string(),
                generated_at,
            },
            Block::Heading("Executive Summary".to_string()),
            Block::Paragraph(deliverable.summary.clone()),
        ];
        if !deliverable.recommendations.is_empty() {
            blocks.push(Block::Heading("Recommendations".to_string()));
            blocks.push(Block::Bullets(deliverable.recommendations.clone()));
        }
        blocks.extend(
            deliverable
                .tables
                .iter()
                .map(|t| Block::Table(TableBlock::from_table(t))),
        );
        blocks.extend(
            deliverable
                .charts
                .iter()
                .map(|c| Block::Chart(ChartBlock::from_chart(c))),
        );

        let mut pages = vec![Page::default()];
        let mut used = 0;
        for block in blocks.into_iter().flat_map(Block::split_to_fit) {
            let height = block.height();
            let current_has_content = pages.last().is_some_and(|p| !p.blocks.is_empty());
            if current_has_content && used + height > PAGE_HEIGHT {
                pages.push(Page::default());
                used = 0;
            }
            used += height;
            if let Some(page) = pages.last_mut() {
                page.blocks.push(block);
            }
        }

        Self { pages }
    }

    /// All table blocks across pages, in order
    pub fn tables(&self) -> impl Iterator<Item = &TableBlock> {
        self.pages
            .iter()
            .flat_map(|p| &p.blocks)
            .filter_map(|b| match b {
                Block::Table(t) => Some(t),
                _ => None,
            })
    }

    /// All chart blocks across pages, in order
    pub fn charts(&self) -> impl Iterator<Item = &ChartBlock> {
        self.pages
            .iter()
            .flat_map(|p| &p.blocks)
            .filter_map(|b| match b {
                Block::Chart(c) => Some(c),
                _ => None,
            })
    }

    /// Render the layout as Markdown
    pub fn to_markdown(&self) -> String {
        let total = self.pages.len();
        let mut out = String::new();
        for (idx, page) in self.pages.iter().enumerate() {
            for block in &page.blocks {
                write_block(&mut out, block);
            }
            out.push_str(&format!("\n_Page {} of {}_\n", idx + 1, total));
            if idx + 1 < total {
                out.push_str("\n---\n\n");
            }
        }
        out
    }
}

fn cell(text: &str, width: usize) -> String {
    let clean = text.replace('|', "\\|").replace('\n', " ");
    format!("{:<width$}", clean, width = width)
}

fn continuation(continued: bool) -> &'static str {
    if continued {
        " (continued)"
    } else {
        ""
    }
}

fn write_block(out: &mut String, block: &Block) {
    match block {
        Block::Title {
            query,
            generated_at,
        } => {
            out.push_str("# Research Report\n\n");
            out.push_str(&format!("**Request:** {}\n\n", query.replace('\n', " ")));
            out.push_str(&format!(
                "**Generated:** {}\n\n",
                generated_at.format("%Y-%m-%d %H:%M UTC")
            ));
        }
        Block::Heading(text) => out.push_str(&format!("## {}\n\n", text)),
        Block::Paragraph(text) => out.push_str(&format!("{}\n\n", text)),
        Block::Bullets(items) => {
            for item in items {
                out.push_str(&format!("- {}\n", item));
            }
            out.push('\n');
        }
        Block::Table(table) => {
            out.push_str(&format!("### {}{}\n\n", table.title, continuation(table.continued)));
            let header: Vec<String> = table
                .header
                .iter()
                .zip(&table.column_widths)
                .map(|(h, w)| cell(h, *w))
                .collect();
            out.push_str(&format!("| {} |\n", header.join(" | ")));
            let separator: Vec<String> =
                table.column_widths.iter().map(|w| "-".repeat(*w)).collect();
            out.push_str(&format!("| {} |\n", separator.join(" | ")));
            for row in &table.rows {
                let cells: Vec<String> = table
                    .column_widths
                    .iter()
                    .enumerate()
                    .map(|(i, w)| cell(row.get(i).map(String::as_str).unwrap_or(""), *w))
                    .collect();
                out.push_str(&format!("| {} |\n", cells.join(" | ")));
            }
            out.push('\n');
        }
        Block::Chart(chart) => {
            out.push_str(&format!(
                "### {}{}\n\n```text\n",
                chart.title,
                continuation(chart.continued)
            ));
            let label_width = chart
                .bars
                .iter()
                .map(|b| b.label.chars().count())
                .max()
                .unwrap_or(0);
            for bar in &chart.bars {
                out.push_str(&format!(
                    "{:<lw$} | {} {}\n",
                    bar.label,
                    "#".repeat(bar.length),
                    bar.value,
                    lw = label_width
                ));
            }
            out.push_str("```\n\n");
        }
    }
}

/// Renderer that writes Markdown reports into a directory
#[derive(Debug, Clone)]
pub struct MarkdownReportRenderer {
    reports_dir: PathBuf,
    url_prefix: String,
}

impl MarkdownReportRenderer {
    /// Write reports into `reports_dir`, served under `url_prefix`
    pub fn new(reports_dir: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            reports_dir: reports_dir.into(),
            url_prefix: url_prefix.into(),
        }
    }
}

#[async_trait]
impl Renderer for MarkdownReportRenderer {
    async fn render(
        &self,
        deliverable: &SynthesizedDeliverable,
        query: &str,
    ) -> Result<ArtifactRef, OrchestrationError> {
        let layout = ReportLayout::build(deliverable, query, Utc::now());
        let filename = format!("report_{}.md", uuid::Uuid::new_v4().simple());

        let path = FileService::write_file(&filename, &layout.to_markdown(), Some(&self.reports_dir))
            .await
            .map_err(|e| OrchestrationError::Render(e.to_string()))?;

        tracing::info!(
            path = %path.display(),
            pages = layout.pages.len(),
            tables = deliverable.tables.len(),
            charts = deliverable.charts.len(),
            "Report rendered"
        );

        Ok(ArtifactRef {
            path: path.to_string_lossy().to_string(),
            url: format!("{}/{}", self.url_prefix.trim_end_matches('/'), filename),
            pages: layout.pages.len(),
        })
    }
}
