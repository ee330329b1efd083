//! `unicam docs`: property reference for one or more backends.
//!
//! Descriptors come from the factories, so no camera is opened.

use anyhow::{Context, Result};
use clap::ValueEnum;
use std::fmt::{self, Write};
use unicam_core::{PropertyDescriptor, PropertyValue, ValueType};
use unicam_registry::CameraRegistry;

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DocFormat {
    /// Standalone HTML page
    #[default]
    Html,
    /// Markdown
    Markdown,
}

/// Properties of one backend.
#[derive(Debug, Clone)]
pub struct BackendDoc {
    /// Registry name
    pub name: String,
    /// Factory description
    pub description: String,
    /// Descriptors in registration order
    pub properties: Vec<PropertyDescriptor>,
}

/// Collect documentation for `names`, or every registered backend if empty.
pub fn collect(registry: &CameraRegistry, names: &[String]) -> Result<Vec<BackendDoc>> {
    let names = if names.is_empty() {
        registry.list()
    } else {
        names.to_vec()
    };

    names
        .into_iter()
        .map(|name| {
            let entry = registry
                .entry(&name)
                .with_context(|| format!("Unknown backend '{}'", name))?;
            let table = entry
                .factory
                .descriptors()
                .with_context(|| format!("Backend '{}' has no valid property table", name))?;
            Ok(BackendDoc {
                description: entry.factory.description().to_string(),
                properties: table.descriptors().to_vec(),
                name,
            })
        })
        .collect()
}

/// Render `docs` in `format`.
pub fn render(format: DocFormat, docs: &[BackendDoc]) -> Result<String> {
    let mut out = String::new();
    match format {
        DocFormat::Html => write_html(&mut out, docs),
        DocFormat::Markdown => write_markdown(&mut out, docs),
    }
    .context("Failed to render property documentation")?;
    Ok(out)
}

/// `"name" : type : access` line.
fn signature(d: &PropertyDescriptor) -> String {
    format!("\"{}\" : {} : {}", d.name, d.value_type, d.access)
}

fn format_value(value: &PropertyValue) -> String {
    match value {
        PropertyValue::Float(v) => format!("{:.1e}", v),
        PropertyValue::Double(v) => format!("{:.1e}", v),
        other => other.to_string(),
    }
}

fn default_text(d: &PropertyDescriptor) -> Option<String> {
    let value = d.default_value.as_ref()?;
    Some(match d.value_type {
        ValueType::Bool => value.to_string().to_uppercase(),
        ValueType::Enum => d.render(value),
        _ => format_value(value),
    })
}

fn range_parts(d: &PropertyDescriptor) -> Option<(String, String)> {
    d.range
        .as_ref()
        .map(|(min, max)| (format_value(min), format_value(max)))
}

fn anchor(backend: &str, property: &str) -> String {
    format!("{}-{}", backend, property)
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

// =============================================================================
// HTML
// =============================================================================

fn write_html<W: Write>(out: &mut W, docs: &[BackendDoc]) -> fmt::Result {
    let title = docs
        .iter()
        .map(|d| d.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    writeln!(
        out,
        "<html><head><link rel=\"stylesheet\" href=\"style.css\" type=\"text/css\" />\
         <title>{} &mdash; properties</title></head><body>",
        escape(&title)
    )?;

    for doc in docs {
        writeln!(
            out,
            "<div id=\"header\"><h1 class=\"title\">Property documentation of {}</h1>\
             <p>{}</p></div>",
            escape(&doc.name),
            escape(&doc.description)
        )?;

        let toc = format!("toc-{}", doc.name);
        write!(out, "<h2>Properties</h2><ul id=\"{}\">", escape(&toc))?;
        for p in &doc.properties {
            write!(
                out,
                "<li><code><a href=\"#{}\">\"{}\"</a></code></li>",
                escape(&anchor(&doc.name, &p.name)),
                escape(&p.name)
            )?;
        }
        out.write_str("</ul>\n<h2>Details</h2><dl>\n")?;
        for p in &doc.properties {
            write_html_property(out, &doc.name, &toc, p)?;
        }
        out.write_str("</dl>\n")?;
    }

    out.write_str("</body></html>\n")
}

fn write_html_property<W: Write>(
    out: &mut W,
    backend: &str,
    toc: &str,
    p: &PropertyDescriptor,
) -> fmt::Result {
    writeln!(
        out,
        "<dt id=\"{}\"><a href=\"#{}\">{}</a></dt>",
        escape(&anchor(backend, &p.name)),
        escape(toc),
        escape(&p.name)
    )?;
    writeln!(
        out,
        "<dd><pre><code class=\"prop-type\">{}</code></pre>",
        escape(&signature(p))
    )?;
    writeln!(out, "<p>{}</p>", escape(&p.description))?;
    if let Some(units) = &p.units {
        writeln!(out, "<p>Units: {}</p>", escape(units))?;
    }
    if let Some((min, max)) = range_parts(p) {
        writeln!(
            out,
            "<p>Possible values: {} &#8804; <em>{}</em> &#8804; {}</p>",
            escape(&min),
            escape(&p.name),
            escape(&max)
        )?;
    }
    if !p.enum_values.is_empty() {
        out.write_str("<p>Possible values: <table><tr><th>Enum name</th><th>Value</th></tr>")?;
        for v in &p.enum_values {
            write!(
                out,
                "<tr><td><code>{}</code></td><td>{}</td></tr>",
                escape(&v.label),
                v.value
            )?;
        }
        out.write_str("</table></p>\n")?;
    }
    if let Some(default) = default_text(p) {
        writeln!(out, "<p>Default value: <code>{}</code></p>", escape(&default))?;
    }
    out.write_str("</dd>\n")
}

// =============================================================================
// Markdown
// =============================================================================

fn write_markdown<W: Write>(out: &mut W, docs: &[BackendDoc]) -> fmt::Result {
    for doc in docs {
        writeln!(out, "# Property documentation of {}\n", doc.name)?;
        if !doc.description.is_empty() {
            writeln!(out, "{}\n", doc.description)?;
        }

        out.write_str("## Properties\n\n")?;
        for p in &doc.properties {
            writeln!(out, "- [`{}`](#{})", p.name, anchor(&doc.name, &p.name))?;
        }

        out.write_str("\n## Details\n")?;
        for p in &doc.properties {
            write_markdown_property(out, &doc.name, p)?;
        }
    }
    Ok(())
}

fn write_markdown_property<W: Write>(
    out: &mut W,
    backend: &str,
    p: &PropertyDescriptor,
) -> fmt::Result {
    writeln!(out, "\n### {}\n", anchor(backend, &p.name))?;
    writeln!(out, "`{}`\n", signature(p))?;
    if !p.description.is_empty() {
        writeln!(out, "{}\n", p.description)?;
    }
    if let Some(units) = &p.units {
        writeln!(out, "Units: {}\n", units)?;
    }
    if let Some((min, max)) = range_parts(p) {
        writeln!(out, "Possible values: {} ≤ *{}* ≤ {}\n", min, p.name, max)?;
    }
    if !p.enum_values.is_empty() {
        out.write_str("| Enum name | Value |\n|---|---|\n")?;
        for v in &p.enum_values {
            writeln!(out, "| `{}` | {} |", v.label, v.value)?;
        }
        out.write_char('\n')?;
    }
    if let Some(default) = default_text(p) {
        writeln!(out, "Default value: `{}`\n", default)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_docs() -> Vec<BackendDoc> {
        let registry = CameraRegistry::with_builtin_backends().unwrap();
        collect(&registry, &["mock".to_string()]).unwrap()
    }

    #[test]
    fn test_collect_everything_by_default() {
        let registry = CameraRegistry::with_builtin_backends().unwrap();
        let docs = collect(&registry, &[]).unwrap();
        let names: Vec<_> = docs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["mock", "file"]);
        assert!(collect(&registry, &["nope".to_string()]).is_err());
    }

    #[test]
    fn test_html_lists_signature_range_and_enum() {
        let html = render(DocFormat::Html, &mock_docs()).unwrap();
        assert!(html.contains("<ul id=\"toc-mock\">"));
        assert!(html.contains("&quot;exposure_time&quot; : double : Read / Write"));
        assert!(html.contains("&quot;name&quot; : string : Read-only"));
        assert!(html.contains("1.0e-4 &#8804; <em>exposure_time</em> &#8804; 1.0e1"));
        assert!(html.contains("<tr><td><code>software</code></td><td>1</td></tr>"));
        assert!(html.contains("Default value: <code>auto</code>"));
        assert!(html.ends_with("</body></html>\n"));
    }

    #[test]
    fn test_markdown_has_toc_and_defaults() {
        let md = render(DocFormat::Markdown, &mock_docs()).unwrap();
        assert!(md.starts_with("# Property documentation of mock\n"));
        assert!(md.contains("- [`roi_x`](#mock-roi_x)"));
        assert!(md.contains("`\"has_streaming\" : bool : Read-only`"));
        assert!(md.contains("Default value: `TRUE`"));
        assert!(md.contains("| `external` | 2 |"));
        assert!(md.contains("Possible values: 1 ≤ *sensor_bitdepth* ≤ 32"));
    }

    /// Sink that refuses every write.
    struct Closed;

    impl fmt::Write for Closed {
        fn write_str(&mut self, _: &str) -> fmt::Result {
            Err(fmt::Error)
        }
    }

    #[test]
    fn test_write_errors_propagate() {
        let docs = mock_docs();
        assert!(write_html(&mut Closed, &docs).is_err());
        assert!(write_markdown(&mut Closed, &docs).is_err());
    }
}
