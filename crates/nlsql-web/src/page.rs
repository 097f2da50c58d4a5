//! HTML rendering of the question form.

use std::fmt::Write;

use nlsql_core::{escape_html, EXAMPLE_QUESTION};
use nlsql_query::AskOutcome;

pub const PAGE_TITLE: &str = "nlsql - Escola";

const STYLE: &str = r#"
      body { font-family: Arial, sans-serif; margin: 24px; }
      .container { max-width: 960px; margin: auto; }
      textarea { width: 100%; height: 100px; font-size: 14px; }
      pre { background: #f6f8fa; padding: 12px; overflow: auto; }
      .card { border: 1px solid #ddd; border-radius: 6px; padding: 16px; margin-top: 16px; }
      .btn { background: #0d6efd; color: #fff; border: none; padding: 10px 16px; border-radius: 4px; cursor: pointer; }
      table { border-collapse: collapse; width: 100%; }
      th, td { border: 1px solid #ddd; padding: 8px; text-align: left; }
      th { background: #f0f0f0; }
      .muted { color: #666; font-size: 12px; }
"#;

/// Render the page, with the result cards when `outcome` is given.
pub fn render_page(outcome: Option<&AskOutcome>) -> String {
    let question = outcome.map(|o| o.question.as_str()).unwrap_or("");

    let mut html = String::with_capacity(4096);
    let _ = write!(
        html,
        r#"<!doctype html>
<html>
  <head>
    <meta charset="utf-8" />
    <title>{title}</title>
    <style>{style}    </style>
  </head>
  <body>
    <div class="container">
      <h1>{title}</h1>
      <form method="post" action="/ask">
        <label for="q">Pergunta</label>
        <textarea id="q" name="q" placeholder="Digite sua pergunta...">{question}</textarea>
        <div style="margin-top: 8px;">
          <button class="btn" type="submit">Perguntar</button>
        </div>
      </form>
"#,
        title = PAGE_TITLE,
        style = STYLE,
        question = escape_html(question),
    );

    if let Some(outcome) = outcome {
        render_outcome(&mut html, outcome);
    }

    let _ = write!(
        html,
        r#"
      <div class="muted" style="margin-top: 16px;">
        Dica: exemplo "{example}"
      </div>
    </div>
  </body>
</html>
"#,
        example = escape_html(EXAMPLE_QUESTION),
    );

    html
}

fn render_outcome(html: &mut String, outcome: &AskOutcome) {
    if let Some(sql) = &outcome.sql {
        card(html, "SQL gerada", &format!("<pre>{}</pre>", escape_html(sql)));
    }

    if let Some(error) = &outcome.error {
        card(html, "Erro", &format!("<pre>{}</pre>", escape_html(error)));
    }

    if let Some(table) = &outcome.table {
        card(html, "Resultado", &table.to_html());
    } else if let Some(rows) = outcome.fallback_rows.as_ref().filter(|r| !r.is_empty()) {
        card(
            html,
            "Resultado (fallback)",
            &format!(
                "<pre>{}</pre>\n        <div class=\"muted\">Obs: fallback executado sem LLM.</div>",
                escape_html(&rows.rows_repr())
            ),
        );
    }
}

fn card(html: &mut String, heading: &str, body: &str) {
    let _ = write!(
        html,
        "\n      <div class=\"card\">\n        <h3>{}</h3>\n        {}\n      </div>\n",
        heading, body
    );
}
