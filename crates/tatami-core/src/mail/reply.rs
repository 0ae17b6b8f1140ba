//! Reply letters sent back to the registrar.

use std::fmt::Write;

use crate::registry::UploadOutcome;
use crate::sheet::RowError;

/// A rendered reply, ready for a [`super::Notifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyLetter {
    /// Recipient address.
    pub to: String,
    /// `Re: <original subject>`.
    pub subject: String,
    /// HTML body.
    pub html: String,
    /// Message-ID of the letter being answered.
    pub in_reply_to: Option<String>,
}

/// What happened to a spreadsheet.
#[derive(Debug, Clone, Copy)]
pub enum Report<'a> {
    /// The sheet was persisted.
    Uploaded {
        /// Persister summary.
        outcome: &'a UploadOutcome,
        /// Rows dropped by the classifier.
        rejected_rows: &'a [RowError],
    },
    /// The sheet was refused as a whole.
    Refused(&'a str),
}

/// Renders the reply for one processed letter.
#[must_use]
pub fn compose_reply(
    to: &str,
    original_subject: &str,
    in_reply_to: Option<&str>,
    report: Report<'_>,
) -> ReplyLetter {
    let mut html = String::from("<html><body>\n");

    match report {
        Report::Uploaded {
            outcome,
            rejected_rows,
        } => {
            let _ = writeln!(
                html,
                "<p>Registration received: {} participant(s) added, {} not added.</p>",
                outcome.added_count,
                outcome.failed_rows + rejected_rows.len()
            );

            if !outcome.added.is_empty() {
                html.push_str("<p>Added:</p>\n<ul>\n");
                for name in &outcome.added {
                    let _ = writeln!(html, "<li>{}</li>", escape(name));
                }
                html.push_str("</ul>\n");
            }

            if !rejected_rows.is_empty() || !outcome.row_errors.is_empty() {
                html.push_str("<p>Not added:</p>\n<ul>\n");
                for error in rejected_rows {
                    let _ = writeln!(html, "<li>{}</li>", escape(&error.to_string()));
                }
                for failure in &outcome.row_errors {
                    let _ = writeln!(html, "<li>{}</li>", escape(&failure.to_string()));
                }
                html.push_str("</ul>\n");
            }
        }
        Report::Refused(reason) => {
            let _ = writeln!(
                html,
                "<p>Your spreadsheet was not accepted: {}.</p>\n\
                 <p>Please fix it and send it again.</p>",
                escape(reason)
            );
        }
    }

    html.push_str("</body></html>\n");

    ReplyLetter {
        to: to.to_string(),
        subject: reply_subject(original_subject),
        html,
        in_reply_to: in_reply_to.map(str::to_string),
    }
}

fn reply_subject(original: &str) -> String {
    let original = original.trim();
    if original.get(..3).is_some_and(|prefix| prefix.eq_ignore_ascii_case("re:")) {
        original.to_string()
    } else {
        format!("Re: {original}")
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
