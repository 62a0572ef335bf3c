//! Mail bodies

use super::Mail;

/// Escape text for inclusion in an HTML body
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn page(greeting_name: &str, paragraphs: &[String]) -> String {
    let mut body = format!("<p>Dear {},</p>", escape_html(greeting_name));
    for p in paragraphs {
        body.push_str("<p>");
        body.push_str(p);
        body.push_str("</p>");
    }
    body.push_str("<p>SchoolHub</p>");
    body
}

pub fn tutor_assignment(to: &str, student: &str, tutor: &str) -> Mail {
    Mail::new(
        to,
        "Tutor assignment",
        page(
            student,
            &[format!("{} has been assigned as your personal tutor.", escape_html(tutor))],
        ),
    )
}

pub fn tutees_assignment(to: &str, tutor: &str, students: &[String]) -> Mail {
    let items: String = students
        .iter()
        .map(|s| format!("<li>{}</li>", escape_html(s)))
        .collect();
    Mail::new(
        to,
        "Tutees assignment",
        page(
            tutor,
            &[
                "The following students have been assigned to you:".to_string(),
                format!("<ul>{}</ul>", items),
            ],
        ),
    )
}

pub fn tutor_unassignment(to: &str, student: &str, tutor: &str) -> Mail {
    Mail::new(
        to,
        "Tutor unassignment",
        page(
            student,
            &[format!("{} is no longer your personal tutor.", escape_html(tutor))],
        ),
    )
}

pub fn tutee_unassignment(to: &str, tutor: &str, student: &str) -> Mail {
    Mail::new(
        to,
        "Tutee unassignment",
        page(
            tutor,
            &[format!("{} is no longer assigned to you.", escape_html(student))],
        ),
    )
}

pub fn tutor_reassignment(to: &str, student: &str, tutor: &str) -> Mail {
    Mail::new(
        to,
        "Tutor reassignment",
        page(
            student,
            &[format!("{} is your personal tutor again.", escape_html(tutor))],
        ),
    )
}

pub fn tutee_reassignment(to: &str, tutor: &str, student: &str) -> Mail {
    Mail::new(
        to,
        "Tutee reassignment",
        page(
            tutor,
            &[format!("{} has been assigned to you again.", escape_html(student))],
        ),
    )
}

/// Notice about something that happened to one of the recipient's blogs
pub fn blog_notice(to: &str, name: &str, subject: &str, what: &str, title: &str) -> Mail {
    Mail::new(
        to,
        subject,
        page(
            name,
            &[format!("{} \"{}\".", escape_html(what), escape_html(title))],
        ),
    )
}

pub fn blog_rated(to: &str, name: &str, title: &str, rating: i32) -> Mail {
    Mail::new(
        to,
        "Blog rated",
        page(
            name,
            &[format!(
                "You rated \"{}\" {} out of 5.",
                escape_html(title),
                rating
            )],
        ),
    )
}

pub fn comment_added(to: &str, name: &str, title: &str, content: &str) -> Mail {
    Mail::new(
        to,
        "Comment posted",
        page(
            name,
            &[
                format!("Your comment on \"{}\" was posted:", escape_html(title)),
                format!("<blockquote>{}</blockquote>", escape_html(content)),
            ],
        ),
    )
}

pub fn comment_deleted(to: &str, name: &str, title: &str, removed: usize) -> Mail {
    Mail::new(
        to,
        "Comment deleted",
        page(
            name,
            &[format!(
                "{} comment(s) were removed from \"{}\".",
                removed,
                escape_html(title)
            )],
        ),
    )
}
