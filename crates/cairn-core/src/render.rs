//! Deterministic markdown rendering of the resolved per-source view.

use crate::MessageRecord;

pub const DIGEST_MARKER_PREFIX: &str = "<!-- cairn-digest: commit `";
pub const DIGEST_MARKER_SUFFIX: &str = "` -->";
/// GitHub rejects comment bodies longer than this many characters.
pub const GITHUB_COMMENT_MAX_CHARS: usize = 65_536;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";
const TRUNCATION_NOTICE: &str = "\n\n_Digest truncated to fit the comment size limit._";
const SECTION_SEPARATOR: &str = "\n\n";
const SECTION_CLOSE: &str = "\n\n</details>";

/// Hidden marker identifying the canonical comment for `commit_sha`.
pub fn digest_marker(commit_sha: &str) -> String {
    format!("{DIGEST_MARKER_PREFIX}{commit_sha}{DIGEST_MARKER_SUFFIX}")
}

fn render_header(commit_sha: &str) -> String {
    format!(
        "{}\n### CI messages for commit `{commit_sha}`",
        digest_marker(commit_sha)
    )
}

/// Escapes text placed inside HTML markup. Message bodies are not passed
/// through this; they render verbatim as markdown.
fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn section_open(record: &MessageRecord) -> String {
    format!(
        "<details open>\n<summary><code>{}</code> | run {} | attempt {} | {}</summary>\n\n",
        escape_html(&record.source_key),
        record.run.run_id,
        record.run.run_attempt,
        record.created_at.format(TIMESTAMP_FORMAT),
    )
}

/// Renders the digest document, bounded to GitHub's comment size limit.
pub fn render_digest(commit_sha: &str, records: &[MessageRecord]) -> String {
    render_digest_with_limit(commit_sha, records, GITHUB_COMMENT_MAX_CHARS)
}

/// Renders the digest document. Sections follow the order of `records`.
///
/// Output longer than `max_chars` keeps whole sections while they fit; the
/// first section that does not fit has its body cut and its `<details>` block
/// closed, and the truncation notice follows. Later sections are dropped. The
/// header (and with it the marker) always survives.
pub fn render_digest_with_limit(
    commit_sha: &str,
    records: &[MessageRecord],
    max_chars: usize,
) -> String {
    let header = render_header(commit_sha);
    if records.is_empty() {
        return format!("{header}\n\n_No messages recorded._");
    }

    let sections = records
        .iter()
        .map(|record| (section_open(record), record.body.as_str()))
        .collect::<Vec<_>>();
    let full_len = header.chars().count()
        + sections
            .iter()
            .map(|(open, body)| {
                SECTION_SEPARATOR.len() + open.chars().count() + body.chars().count()
                    + SECTION_CLOSE.len()
            })
            .sum::<usize>();

    let notice_len = TRUNCATION_NOTICE.chars().count();
    let max_chars = max_chars.max(header.chars().count() + notice_len);
    let mut document = header;
    if full_len <= max_chars {
        for (open, body) in &sections {
            push_section(&mut document, open, body);
        }
        return document;
    }

    let budget = max_chars - notice_len;
    let mut used = document.chars().count();
    for (open, body) in &sections {
        let overhead = SECTION_SEPARATOR.len() + open.chars().count() + SECTION_CLOSE.len();
        let body_len = body.chars().count();
        if used + overhead + body_len <= budget {
            push_section(&mut document, open, body);
            used += overhead + body_len;
            continue;
        }
        if used + overhead < budget {
            let kept = body.chars().take(budget - used - overhead).collect::<String>();
            push_section(&mut document, open, &kept);
        }
        break;
    }
    document.push_str(TRUNCATION_NOTICE);
    document
}

fn push_section(document: &mut String, open: &str, body: &str) {
    document.push_str(SECTION_SEPARATOR);
    document.push_str(open);
    document.push_str(body);
    document.push_str(SECTION_CLOSE);
}
