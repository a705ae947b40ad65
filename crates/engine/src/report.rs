//! Static HTML report assembly.
//!
//! Pure string building over caller-ordered (title, content) sections; no
//! persistence or network access. Section content is trusted HTML produced
//! by the caller; table helpers escape cell text.

use crate::types::Holding;

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Render a generic table with a heading
pub fn table_to_html(title: &str, headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut html = format!("<h3>{}</h3>\n<table>\n<tr>", escape(title));
    for h in headers {
        html.push_str(&format!("<th>{}</th>", escape(h)));
    }
    html.push_str("</tr>\n");
    for row in rows {
        html.push_str("<tr>");
        for cell in row {
            html.push_str(&format!("<td>{}</td>", escape(cell)));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</table>");
    html
}

/// Render a version's holdings as a table
pub fn holdings_table_html(holdings: &[Holding]) -> String {
    let rows: Vec<Vec<String>> = holdings
        .iter()
        .map(|h| {
            vec![
                h.ticker.clone(),
                format!("{:.2}", h.weight),
                h.notes.clone().unwrap_or_default(),
            ]
        })
        .collect();
    table_to_html("Current Holdings", &["ticker", "weight", "notes"], &rows)
}

/// Assemble the full report document in the caller's section order
pub fn build_report_html(sections: &[(String, String)]) -> String {
    let body: String = sections
        .iter()
        .map(|(title, content)| {
            format!(
                "<section><h2>{}</h2><div>{}</div></section>",
                escape(title),
                content
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"<html>
<head>
  <style>
    body {{font-family: Arial, sans-serif; margin: 24px;}}
    h1, h2 {{color: #1E3A8A;}}
    table {{border-collapse: collapse; width: 100%;}}
    th, td {{border: 1px solid #ddd; padding: 8px; text-align: right;}}
    th {{background: #f3f4f6;}}
  </style>
</head>
<body>
  <h1>Basket Desk Report</h1>
  {body}
</body>
</html>
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sections_appear_in_caller_order() {
        let html = build_report_html(&[
            ("Summary".to_string(), "Mixed regime.".to_string()),
            ("Holdings".to_string(), "<table></table>".to_string()),
        ]);
        let summary_pos = html.find("<h2>Summary</h2>").unwrap();
        let holdings_pos = html.find("<h2>Holdings</h2>").unwrap();
        assert!(summary_pos < holdings_pos);
        assert!(html.contains("Basket Desk Report"));
    }

    #[test]
    fn test_table_escapes_cells() {
        let html = table_to_html(
            "T",
            &["a"],
            &[vec!["<script>alert(1)</script>".to_string()]],
        );
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn test_holdings_table_formats_weights() {
        let holdings = vec![Holding::new("SPY", 59.456)];
        let html = holdings_table_html(&holdings);
        assert!(html.contains("<td>SPY</td>"));
        assert!(html.contains("<td>59.46</td>"));
    }
}
