use crate::extractor::TextSpan;
use crate::models::{BlockBounds, IngestionOptions, PageBlock};

/// Merges raw spans into page blocks. Consecutive spans stay in one block
/// while the vertical gap between them is at most `block_gap_points`; a
/// larger gap starts a new block. Geometry is the union of the member spans.
pub fn group_spans(
    page_number: u32,
    spans: &[TextSpan],
    options: &IngestionOptions,
) -> Vec<PageBlock> {
    let mut groups: Vec<Vec<&TextSpan>> = Vec::new();

    for span in spans {
        if span.text.trim().is_empty() {
            continue;
        }

        if let Some(group) = groups.last_mut() {
            if let Some(previous) = group.last() {
                if span.bounds.top - previous.bounds.bottom <= options.block_gap_points {
                    group.push(span);
                    continue;
                }
            }
        }

        groups.push(vec![span]);
    }

    groups
        .into_iter()
        .enumerate()
        .filter_map(|(index, group)| {
            let text = group
                .iter()
                .map(|span| span.text.trim())
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .to_string();

            if text.is_empty() {
                return None;
            }

            Some(PageBlock {
                block_id: format!("p{page_number}-b{index:02}"),
                text,
                bounds: union_bounds(&group),
                char_start: 0,
                char_end: 0,
                section_hint: None,
                embedding: None,
            })
        })
        .collect()
}

fn union_bounds(group: &[&TextSpan]) -> BlockBounds {
    let mut left = f32::MAX;
    let mut top = f32::MAX;
    let mut right = f32::MIN;
    let mut bottom = f32::MIN;

    for span in group {
        left = left.min(span.bounds.left);
        top = top.min(span.bounds.top);
        right = right.max(span.bounds.right);
        bottom = bottom.max(span.bounds.bottom);
    }

    BlockBounds {
        left: left as i32,
        top: top as i32,
        right: right as i32,
        bottom: bottom as i32,
    }
}

/// Greedy left-to-right reconciliation of block text against the full page
/// text. Each block is searched for starting at the running cursor; a hit
/// sets `[char_start, char_end)` and moves the cursor past the match. A miss
/// falls back to the approximate position at the cursor and advances by the
/// block length, so offsets stay monotonically non-decreasing either way.
pub fn assign_char_offsets(blocks: &mut [PageBlock], full_text: &str) {
    let mut cursor = 0usize;

    for block in blocks {
        let found = full_text
            .get(cursor..)
            .and_then(|remainder| remainder.find(block.text.as_str()))
            .map(|position| cursor + position);

        match found {
            Some(start) => {
                block.char_start = start;
                block.char_end = start + block.text.len();
            }
            None => {
                block.char_start = cursor;
                block.char_end = cursor + block.text.len();
            }
        }

        cursor = block.char_end;
    }
}
