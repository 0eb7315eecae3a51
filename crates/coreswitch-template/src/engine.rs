//! A small, deterministic Handlebars-like template language over JSON.
//!
//! | tag                              | meaning                                 |
//! |----------------------------------|-----------------------------------------|
//! | `{{ path }}`                     | JSON encoding of the value              |
//! | `{{ raw path }}`                 | strings without quotes                  |
//! | `{{#each path}}…{{/each}}`       | iterate an array                        |
//! | `{{#if path}}…{{else}}…{{/if}}`  | branch on JSON truthiness               |
//! | `{{#unless path}}…{{/unless}}`   | inverse of `if`                         |
//! | `{{! comment }}`                 | ignored                                 |
//!
//! Paths are dotted (`agent.core_version`, `inbounds.0.tag`) and resolve in
//! the innermost `each` scope first, then in the root. `this` is the current
//! item, `@index`, `@first` and `@last` describe the loop, and `@root.`
//! forces root lookup.
//!
//! Printing or iterating an unresolved path is an error. `if` and `unless`
//! treat a missing value as false.

use serde_json::Value;

use crate::error::{Result, TemplateError};

/// A compiled template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Text(String),
    Print { path: Path, raw: bool },
    Each { path: Path, body: Vec<Node>, otherwise: Vec<Node> },
    If { path: Path, negate: bool, then: Vec<Node>, otherwise: Vec<Node> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Anchor {
    Scope,
    Root,
    This,
    Index,
    First,
    Last,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Path {
    source: String,
    anchor: Anchor,
    segments: Vec<String>,
}

impl Path {
    fn parse(source: &str, line: usize) -> Result<Self> {
        let syntax = |message: String| TemplateError::Syntax { line, message };
        if source.is_empty() {
            return Err(syntax("empty placeholder".to_string()));
        }
        if let Some(c) = source
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '@')))
        {
            return Err(syntax(format!("invalid character {c:?} in {source:?}")));
        }

        let mut parts = source.split('.');
        let head = parts.next().unwrap_or_default();
        let mut segments: Vec<String> = parts.map(str::to_string).collect();

        let anchor = match head {
            "this" => Anchor::This,
            "@root" => Anchor::Root,
            "@index" => Anchor::Index,
            "@first" => Anchor::First,
            "@last" => Anchor::Last,
            h if h.starts_with('@') => {
                return Err(syntax(format!("unknown variable {h:?}")));
            }
            h => {
                segments.insert(0, h.to_string());
                Anchor::Scope
            }
        };

        if segments.iter().any(String::is_empty) {
            return Err(syntax(format!("empty segment in {source:?}")));
        }
        if matches!(anchor, Anchor::Index | Anchor::First | Anchor::Last) && !segments.is_empty() {
            return Err(syntax(format!("{head} has no fields")));
        }
        if anchor == Anchor::Root && segments.is_empty() {
            return Err(syntax("@root needs a field".to_string()));
        }

        Ok(Self {
            source: source.to_string(),
            anchor,
            segments,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Each,
    If,
    Unless,
}

impl BlockKind {
    const fn name(self) -> &'static str {
        match self {
            Self::Each => "each",
            Self::If => "if",
            Self::Unless => "unless",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "each" => Some(Self::Each),
            "if" => Some(Self::If),
            "unless" => Some(Self::Unless),
            _ => None,
        }
    }
}

struct OpenBlock {
    kind: BlockKind,
    path: Path,
    line: usize,
    body: Vec<Node>,
    otherwise: Option<Vec<Node>>,
}

impl OpenBlock {
    fn target(&mut self) -> &mut Vec<Node> {
        match &mut self.otherwise {
            Some(otherwise) => otherwise,
            None => &mut self.body,
        }
    }

    fn close(self) -> Node {
        let otherwise = self.otherwise.unwrap_or_default();
        match self.kind {
            BlockKind::Each => Node::Each {
                path: self.path,
                body: self.body,
                otherwise,
            },
            BlockKind::If | BlockKind::Unless => Node::If {
                path: self.path,
                negate: self.kind == BlockKind::Unless,
                then: self.body,
                otherwise,
            },
        }
    }
}

impl Template {
    /// Compile template text.
    ///
    /// # Errors
    ///
    /// Returns `TemplateError::Syntax` for unclosed or mismatched tags and
    /// malformed placeholders.
    pub fn compile(source: &str) -> Result<Self> {
        let mut root: Vec<Node> = Vec::new();
        let mut stack: Vec<OpenBlock> = Vec::new();
        let mut rest = source;
        let mut line = 1;

        while !rest.is_empty() {
            let Some(start) = rest.find("{{") else {
                push_node(&mut stack, &mut root, Node::Text(rest.to_string()));
                break;
            };
            if start > 0 {
                push_node(&mut stack, &mut root, Node::Text(rest[..start].to_string()));
            }
            line += rest[..start].matches('\n').count();

            let after = &rest[start + 2..];
            let end = after.find("}}").ok_or_else(|| TemplateError::Syntax {
                line,
                message: "unclosed '{{'".to_string(),
            })?;
            let tag = after[..end].trim();
            rest = &after[end + 2..];

            compile_tag(tag, line, &mut stack, &mut root)?;
            line += after[..end].matches('\n').count();
        }

        if let Some(open) = stack.pop() {
            return Err(TemplateError::Syntax {
                line: open.line,
                message: format!("{{{{#{}}}}} is never closed", open.kind.name()),
            });
        }

        Ok(Self { nodes: root })
    }

    /// Render against a JSON context.
    ///
    /// # Errors
    ///
    /// Returns an error if a printed or iterated path does not resolve, or an
    /// `each` target is not an array.
    pub fn render(&self, context: &Value) -> Result<String> {
        let mut out = String::new();
        let mut scopes = vec![Scope {
            value: context,
            position: None,
        }];
        render_nodes(&self.nodes, context, &mut scopes, &mut out)?;
        Ok(out)
    }
}

/// Compile and render in one step.
///
/// # Errors
///
/// Returns any compile or render error.
pub fn render(source: &str, context: &Value) -> Result<String> {
    Template::compile(source)?.render(context)
}

fn push_node(stack: &mut [OpenBlock], root: &mut Vec<Node>, node: Node) {
    match stack.last_mut() {
        Some(open) => open.target().push(node),
        None => root.push(node),
    }
}

fn compile_tag(
    tag: &str,
    line: usize,
    stack: &mut Vec<OpenBlock>,
    root: &mut Vec<Node>,
) -> Result<()> {
    let syntax = |message: String| TemplateError::Syntax { line, message };

    if tag.starts_with('!') {
        return Ok(());
    }

    if let Some(open) = tag.strip_prefix('#') {
        let (name, arg) = open.split_once(char::is_whitespace).unwrap_or((open, ""));
        let kind = BlockKind::from_name(name)
            .ok_or_else(|| syntax(format!("unknown block helper {name:?}")))?;
        stack.push(OpenBlock {
            kind,
            path: Path::parse(arg.trim(), line)?,
            line,
            body: Vec::new(),
            otherwise: None,
        });
        return Ok(());
    }

    if let Some(close) = tag.strip_prefix('/') {
        let close = close.trim();
        let open = stack
            .pop()
            .ok_or_else(|| syntax(format!("unexpected {{{{/{close}}}}}")))?;
        if open.kind.name() != close {
            return Err(syntax(format!(
                "{{{{/{close}}}}} closes {{{{#{}}}}} opened on line {}",
                open.kind.name(),
                open.line
            )));
        }
        push_node(stack, root, open.close());
        return Ok(());
    }

    if tag == "else" {
        let open = stack
            .last_mut()
            .ok_or_else(|| syntax("{{else}} outside a block".to_string()))?;
        if open.otherwise.is_some() {
            return Err(syntax("duplicate {{else}}".to_string()));
        }
        open.otherwise = Some(Vec::new());
        return Ok(());
    }

    let (raw, path) = match tag.split_once(char::is_whitespace) {
        Some(("raw", path)) => (true, path.trim()),
        Some(_) => return Err(syntax(format!("unexpected expression {tag:?}"))),
        None => (false, tag),
    };
    push_node(
        stack,
        root,
        Node::Print {
            path: Path::parse(path, line)?,
            raw,
        },
    );
    Ok(())
}

struct Scope<'a> {
    value: &'a Value,
    /// `(index, len)` when the scope is an `each` item.
    position: Option<(usize, usize)>,
}

fn lookup<'a>(mut value: &'a Value, segments: &[String]) -> Option<&'a Value> {
    for segment in segments {
        value = match value {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(value)
}

/// Resolve a path; loop variables produce owned values.
fn resolve<'a>(path: &Path, root: &'a Value, scopes: &[Scope<'a>]) -> Option<Value> {
    let current = scopes.last()?;
    let position = || scopes.iter().rev().find_map(|s| s.position);

    match path.anchor {
        Anchor::Root => lookup(root, &path.segments).cloned(),
        Anchor::This => lookup(current.value, &path.segments).cloned(),
        Anchor::Scope => lookup(current.value, &path.segments)
            .or_else(|| lookup(root, &path.segments))
            .cloned(),
        Anchor::Index => position().map(|(i, _)| Value::from(i)),
        Anchor::First => position().map(|(i, _)| Value::from(i == 0)),
        Anchor::Last => position().map(|(i, len)| Value::from(i + 1 == len)),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn render_nodes<'a>(
    nodes: &[Node],
    root: &'a Value,
    scopes: &mut Vec<Scope<'a>>,
    out: &mut String,
) -> Result<()> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Print { path, raw } => {
                let value = resolve(path, root, scopes)
                    .ok_or_else(|| TemplateError::UnresolvedPath(path.source.clone()))?;
                match value {
                    Value::String(s) if *raw => out.push_str(&s),
                    other => out.push_str(&other.to_string()),
                }
            }
            Node::If {
                path,
                negate,
                then,
                otherwise,
            } => {
                let truth = resolve(path, root, scopes).is_some_and(|v| truthy(&v));
                let branch = if truth != *negate { then } else { otherwise };
                render_nodes(branch, root, scopes, out)?;
            }
            Node::Each {
                path,
                body,
                otherwise,
            } => {
                let items = resolve_array(path, root, scopes)?;
                if items.is_empty() {
                    render_nodes(otherwise, root, scopes, out)?;
                    continue;
                }
                let len = items.len();
                for (index, item) in items.iter().enumerate() {
                    scopes.push(Scope {
                        value: item,
                        position: Some((index, len)),
                    });
                    let result = render_nodes(body, root, scopes, out);
                    scopes.pop();
                    result?;
                }
            }
        }
    }
    Ok(())
}

/// Resolve an `each` target to borrowed items.
fn resolve_array<'a>(path: &Path, root: &'a Value, scopes: &[Scope<'a>]) -> Result<&'a [Value]> {
    let unresolved = || TemplateError::UnresolvedPath(path.source.clone());
    let current = scopes.last().ok_or_else(unresolved)?;

    let value = match path.anchor {
        Anchor::Root => lookup(root, &path.segments),
        Anchor::This => lookup(current.value, &path.segments),
        Anchor::Scope => {
            lookup(current.value, &path.segments).or_else(|| lookup(root, &path.segments))
        }
        Anchor::Index | Anchor::First | Anchor::Last => {
            return Err(TemplateError::TypeMismatch {
                path: path.source.clone(),
                expected: "an array",
            })
        }
    }
    .ok_or_else(unresolved)?;

    match value {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(&[]),
        _ => Err(TemplateError::TypeMismatch {
            path: path.source.clone(),
            expected: "an array",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> Value {
        json!({
            "inbounds": [{"tag": "a", "port": 1}, {"tag": "b", "port": 2}],
            "agent": {"name": "edge \"1\"", "core_version": "1.8.0", "capabilities": []},
            "server": {"log_level": "warn"},
            "users": []
        })
    }

    #[test]
    fn prints_json_and_raw() {
        let out = render(r#"{"name": {{ agent.name }}, "v": "v{{raw agent.core_version}}"}"#, &ctx()).unwrap();
        assert_eq!(out, r#"{"name": "edge \"1\"", "v": "v1.8.0"}"#);
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["name"], "edge \"1\"");
    }

    #[test]
    fn each_with_loop_variables() {
        let src = "[{{#each inbounds}}{{#unless @first}},{{/unless}}{{this.tag}}:{{@index}}{{/each}}]";
        assert_eq!(render(src, &ctx()).unwrap(), r#"["a":0,"b":1]"#);

        let src = "{{#each inbounds}}{{#if @last}}{{port}}{{/if}}{{/each}}";
        assert_eq!(render(src, &ctx()).unwrap(), "2");
    }

    #[test]
    fn embeds_whole_objects() {
        let out = render("{{inbounds.1}}", &ctx()).unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value, json!({"tag": "b", "port": 2}));
    }

    #[test]
    fn scope_falls_back_to_root() {
        let src = "{{#each inbounds}}{{raw server.log_level}}{{raw @root.agent.core_version}};{{/each}}";
        assert_eq!(render(src, &ctx()).unwrap(), "warn1.8.0;warn1.8.0;");
    }

    #[test]
    fn if_else_and_empty_each() {
        let src = "{{#if users}}some{{else}}none{{/if}}|{{#each users}}x{{else}}empty{{/each}}|{{#if missing.field}}y{{else}}n{{/if}}";
        assert_eq!(render(src, &ctx()).unwrap(), "none|empty|n");
    }

    #[test]
    fn comments_are_dropped() {
        assert_eq!(render("a{{! note }}b", &ctx()).unwrap(), "ab");
    }

    #[test]
    fn unresolved_placeholder_is_fatal() {
        assert_eq!(
            render("{{agent.region}}", &ctx()),
            Err(TemplateError::UnresolvedPath("agent.region".to_string()))
        );
        assert!(matches!(
            render("{{#each nothing}}{{/each}}", &ctx()),
            Err(TemplateError::UnresolvedPath(_))
        ));
        assert!(matches!(
            render("{{@index}}", &ctx()),
            Err(TemplateError::UnresolvedPath(_))
        ));
    }

    #[test]
    fn each_requires_array() {
        assert!(matches!(
            render("{{#each agent}}{{/each}}", &ctx()),
            Err(TemplateError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn syntax_errors_report_lines() {
        let err = Template::compile("{\n  {{#each inbounds}}\n").unwrap_err();
        assert_eq!(
            err,
            TemplateError::Syntax {
                line: 2,
                message: "{{#each}} is never closed".to_string()
            }
        );

        let err = Template::compile("a\nb\n{{#if x}}{{/each}}").unwrap_err();
        assert!(matches!(err, TemplateError::Syntax { line: 3, .. }));

        assert!(Template::compile("{{ unclosed").is_err());
        assert!(Template::compile("{{}}").is_err());
        assert!(Template::compile("{{#with a}}{{/with}}").is_err());
        assert!(Template::compile("{{a b}}").is_err());
        assert!(Template::compile("{{else}}").is_err());
        assert!(Template::compile("{{a..b}}").is_err());
    }

    #[test]
    fn rendering_is_deterministic() {
        let template = Template::compile("{{#each inbounds}}{{this}}{{/each}}").unwrap();
        let context = ctx();
        assert_eq!(template.render(&context).unwrap(), template.render(&context).unwrap());
    }
}
