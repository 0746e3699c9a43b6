//! Name and output templates
//!
//! Templates are plain text with `{{.Field}}` actions (whitespace inside
//! the braces is allowed). Only field references are supported; anything
//! else, an unterminated action or a field the context does not know is a
//! template error. Nothing renders as blank by accident.

use ec2kit_core::{Ec2KitError, Result};

/// Output line printed per launched instance when none is configured
pub const DEFAULT_OUTPUT_TEMPLATE: &str = "{{.InstanceId}}\t{{.Name}}\t{{.PublicIp}}\t{{.PrivateIp}}";

/// Values a template can refer to
pub trait TemplateContext {
    /// Value of `field`, `None` when the context has no such field
    fn field(&self, field: &str) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Text(String),
    Field(String),
}

/// A parsed template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    parts: Vec<Part>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self> {
        let mut parts = Vec::new();
        let mut rest = source;

        while let Some(open) = rest.find("{{") {
            if open > 0 {
                parts.push(Part::Text(rest[..open].to_string()));
            }

            let after = &rest[open + 2..];
            let close = after.find("}}").ok_or_else(|| {
                Ec2KitError::template(format!("unterminated action in {source:?}"))
            })?;

            parts.push(Part::Field(parse_field(after[..close].trim(), source)?));
            rest = &after[close + 2..];
        }

        if !rest.is_empty() {
            parts.push(Part::Text(rest.to_string()));
        }

        Ok(Self {
            source: source.to_string(),
            parts,
        })
    }

    /// Whether the template refers to `field`
    pub fn references(&self, field: &str) -> bool {
        self.parts
            .iter()
            .any(|p| matches!(p, Part::Field(f) if f == field))
    }

    pub fn render(&self, context: &dyn TemplateContext) -> Result<String> {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Text(text) => out.push_str(text),
                Part::Field(field) => {
                    let value = context.field(field).ok_or_else(|| {
                        Ec2KitError::template(format!(
                            "can't evaluate field {field} in {:?}",
                            self.source
                        ))
                    })?;
                    out.push_str(&value);
                }
            }
        }
        Ok(out)
    }
}

fn parse_field(action: &str, source: &str) -> Result<String> {
    let field = action.strip_prefix('.').unwrap_or_default();
    let valid = !field.is_empty()
        && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && field.starts_with(|c: char| c.is_ascii_alphabetic());

    if !valid {
        return Err(Ec2KitError::template(format!(
            "unsupported action {{{{{action}}}}} in {source:?}"
        )));
    }
    Ok(field.to_string())
}

/// Context of a name-tag template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameContext {
    pub symbol: String,
    /// 1-based index of the launch override within its specification
    pub sequence: usize,
}

impl TemplateContext for NameContext {
    fn field(&self, field: &str) -> Option<String> {
        match field {
            "Symbol" => Some(self.symbol.clone()),
            "Sequence" => Some(self.sequence.to_string()),
            _ => None,
        }
    }
}

/// Context of an output template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputContext {
    pub instance_id: String,
    pub name: String,
    pub public_ip: String,
    pub private_ip: String,
    pub symbol: String,
    pub sequence: usize,
}

impl TemplateContext for OutputContext {
    fn field(&self, field: &str) -> Option<String> {
        match field {
            "InstanceId" => Some(self.instance_id.clone()),
            "Name" => Some(self.name.clone()),
            "PublicIp" => Some(self.public_ip.clone()),
            "PrivateIp" => Some(self.private_ip.clone()),
            "Symbol" => Some(self.symbol.clone()),
            "Sequence" => Some(self.sequence.to_string()),
            _ => None,
        }
    }
}
