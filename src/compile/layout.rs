//! Tables and column lists.

use super::{BlockCompiler, alt_text, escape_attr};
use crate::media::MediaKind;
use crate::model::{Block, BlockKind, RichSpan};
use tracing::debug;

/// Pipe table. Rows are padded to the widest of the declared width and the
/// longest row; without a header row an empty one is emitted, since pipe
/// tables require one.
pub(super) fn table(
    compiler: &BlockCompiler<'_>,
    width: usize,
    has_column_header: bool,
    children: &[Block],
) -> String {
    let rows: Vec<Vec<String>> = children
        .iter()
        .filter_map(|child| match &child.kind {
            BlockKind::TableRow { cells } => Some(
                cells
                    .iter()
                    .map(|cell| table_cell(compiler, cell))
                    .collect(),
            ),
            _ => {
                debug!(block = %child.id, "Ignoring non-row child of table");
                None
            }
        })
        .collect();
    if rows.is_empty() {
        return String::new();
    }

    let columns = rows.iter().map(Vec::len).max().unwrap_or(0).max(width).max(1);
    let separator = format_row(&vec!["---".to_string(); columns]);

    let mut lines = Vec::with_capacity(rows.len() + 2);
    let mut body = rows.into_iter();
    if has_column_header {
        if let Some(header) = body.next() {
            lines.push(format_row(&pad(header, columns)));
        }
    } else {
        lines.push(format_row(&vec![String::new(); columns]));
    }
    lines.push(separator);
    lines.extend(body.map(|row| format_row(&pad(row, columns))));
    lines.join("\n")
}

fn table_cell(compiler: &BlockCompiler<'_>, cell: &[RichSpan]) -> String {
    compiler
        .inline(cell)
        .replace('|', "\\|")
        .replace("\r\n", "<br>")
        .replace('\n', "<br>")
}

fn pad(mut row: Vec<String>, columns: usize) -> Vec<String> {
    row.resize(columns, String::new());
    row
}

fn format_row(cells: &[String]) -> String {
    format!("| {} |", cells.join(" | "))
}

/// Columns side by side. When every column holds only images the result is
/// an image grid; otherwise each column's Markdown goes in a flex child.
pub(super) fn column_list(compiler: &BlockCompiler<'_>, columns: &[Block]) -> String {
    if columns.is_empty() {
        return String::new();
    }
    if is_image_grid(columns) {
        image_grid(compiler, columns)
    } else {
        flex_columns(compiler, columns)
    }
}

fn is_image_grid(columns: &[Block]) -> bool {
    columns.iter().all(|column| {
        !column.children.is_empty()
            && column
                .children
                .iter()
                .all(|b| matches!(b.kind, BlockKind::Image { .. }))
    })
}

fn image_grid(compiler: &BlockCompiler<'_>, columns: &[Block]) -> String {
    let mut out = format!(
        "<div class=\"notion-image-grid\" style=\"display:grid; grid-template-columns:repeat({}, 1fr); gap:1rem;\">",
        columns.len()
    );
    for image in columns.iter().flat_map(|c| c.children.iter()) {
        let BlockKind::Image { source, caption } = &image.kind else {
            continue;
        };
        if source.url().trim().is_empty() {
            continue;
        }
        let src = compiler.media.materialize(source.url(), MediaKind::Image);
        out.push_str(&format!(
            "\n<img src=\"{}\" alt=\"{}\" loading=\"lazy\">",
            escape_attr(&src),
            escape_attr(&alt_text(caption))
        ));
    }
    out.push_str("\n</div>");
    out
}

fn flex_columns(compiler: &BlockCompiler<'_>, columns: &[Block]) -> String {
    let mut out = String::from(
        "<div class=\"notion-columns\" style=\"display:flex; flex-wrap:wrap; gap:1rem;\">",
    );
    for column in columns {
        let body = match column.kind {
            BlockKind::Column => compiler.compile(&column.children),
            // A stray non-column child is laid out as a column of its own.
            _ => compiler.compile(std::slice::from_ref(column)),
        };
        out.push_str("\n<div class=\"notion-column\" style=\"flex:1 1 0; min-width:16rem;\">");
        if !body.is_empty() {
            // Blank lines around the body let the renderer parse it as Markdown.
            out.push_str("\n\n");
            out.push_str(&body);
            out.push('\n');
        }
        out.push_str("\n</div>");
    }
    out.push_str("\n</div>");
    out
}
