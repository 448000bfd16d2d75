//! Server-rendered pages of the lead CRUD service.

use crate::models::Lead;

/// Folder served under `/static`.
pub const STATIC_FOLDER: &str = "static";

const PAGE_TITLE: &str = "Lead CRM";

/// Renders the lead list with the add/update form and delete links.
pub fn render_leads_page(leads: &[Lead]) -> String {
    let mut rows = String::new();

    if leads.is_empty() {
        rows.push_str(r#"<tr><td colspan="7" class="empty">No leads yet. Add one below.</td></tr>"#);
    }

    for lead in leads {
        let company = text(&lead.company);
        let first_name = text(&lead.first_name);
        let last_name = text(&lead.last_name);
        let email = text(&lead.email_address);
        let phone_number = text(&lead.phone_number);

        rows.push_str(&format!(
            r#"<tr>
    <td>{id}</td>
    <td>{company}</td>
    <td>{first_name}</td>
    <td>{last_name}</td>
    <td>{email}</td>
    <td>{phone_number}</td>
    <td class="actions">
        <button type="button" class="edit-lead" data-user-id="{id}" data-company="{company}" data-first-name="{first_name}" data-last-name="{last_name}" data-email="{email}" data-phone-number="{phone_number}">Edit</button>
        <a href="/del-lead/{id}" class="delete-lead" data-user-id="{id}">Delete</a>
    </td>
</tr>
"#,
            id = lead.user_id,
        ));
    }

    let content = format!(
        r#"<h1>{title}</h1>
<table id="leads">
    <thead>
        <tr><th>ID</th><th>Company</th><th>First name</th><th>Last name</th><th>Email</th><th>Phone number</th><th></th></tr>
    </thead>
    <tbody>
{rows}    </tbody>
</table>

<h2 id="lead-form-title">Add New Lead</h2>
<form id="lead-form" method="post" action="/manage-lead">
    <div id="div-user-id" hidden>
        <label for="user_id">User ID</label>
        <input id="user_id" name="user_id" readonly>
    </div>
    <label for="company">Company</label>
    <input id="company" name="company">
    <label for="first_name">First name</label>
    <input id="first_name" name="first_name">
    <label for="last_name">Last name</label>
    <input id="last_name" name="last_name">
    <label for="email">Email</label>
    <input id="email" name="email" type="email">
    <label for="phone_number">Phone number</label>
    <input id="phone_number" name="phone_number">
    <button id="save-button" type="submit">Save</button>
    <button id="reset-button" type="reset">Cancel</button>
</form>
<script src="/static/js/main.js"></script>"#,
        title = PAGE_TITLE,
    );

    build_page(PAGE_TITLE, &content)
}

fn build_page(title: &str, content: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<style>
body {{ font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", sans-serif; margin: 24px; color: #222; }}
table {{ border-collapse: collapse; width: 100%; margin-bottom: 24px; }}
th, td {{ border-bottom: 1px solid #ddd; padding: 6px 8px; text-align: left; }}
td.empty {{ color: #888; text-align: center; padding: 24px; }}
form {{ display: grid; grid-template-columns: 140px 320px; gap: 8px; align-items: center; }}
form button {{ grid-column: 2; width: 120px; }}
</style>
</head>
<body>
{content}
</body>
</html>"#,
        title = html_escape(title),
    )
}

fn text(value: &Option<String>) -> String {
    value.as_deref().map(html_escape).unwrap_or_default()
}

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
