//! nlsql-web - browser form for asking questions
//!
//! `GET /` renders the form; `POST /ask` answers the `q` field with the
//! shared [`nlsql_query::SqlAgent`] and renders the SQL, the rows, or the
//! fallback rows.

mod app;
mod page;

pub use app::{router, serve, AppState, AskForm};
pub use page::{render_page, PAGE_TITLE};
