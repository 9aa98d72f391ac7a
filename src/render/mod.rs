use once_cell::sync::Lazy;
use serde::Serialize;
use tera::{Context, Tera};
use thiserror::Error;

pub mod page;
pub mod plot;

pub use page::{DashboardPage, MessageKind, StationOption, Summary, render_page};
pub use plot::{render_detection, render_reference};

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Template setup failed: {0}")]
    Setup(String),
    #[error("Template rendering failed: {0}")]
    Template(#[from] tera::Error),
}

static TEMPLATES: Lazy<Result<Tera, String>> = Lazy::new(|| {
    let mut tera = Tera::default();
    tera.autoescape_on(vec![".html", ".svg"]);
    tera.add_raw_templates(vec![
        ("index.html", include_str!("../../templates/index.html")),
        ("scatter.svg", include_str!("../../templates/scatter.svg")),
    ])
    .map_err(|e| e.to_string())?;
    Ok(tera)
});

fn templates() -> Result<&'static Tera, RenderError> {
    TEMPLATES
        .as_ref()
        .map_err(|e| RenderError::Setup(e.clone()))
}

fn render_template<T: Serialize>(name: &str, data: &T) -> Result<String, RenderError> {
    let context = Context::from_serialize(data)?;
    Ok(templates()?.render(name, &context)?)
}
