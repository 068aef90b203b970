// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Language-normalized shape extraction over a diff window.
//!
//! Python gets a proper AST walk via tree-sitter; TypeScript/JavaScript, Go,
//! and Rust fall back to regex extraction of the same shapes with lower
//! confidence. Malformed input or oversized files yield empty shapes, never
//! an error.

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

/// Files above this size are skipped with a logged observation.
pub const MAX_ANALYZED_BYTES: usize = 1024 * 1024;

/// Normalized function signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionShape {
    pub name: String,
    pub arity: usize,
    /// Per-parameter kind: "plain", "default", "vararg", "kwarg".
    pub param_kinds: Vec<String>,
}

impl FunctionShape {
    /// Shape key used for cross-file matching.
    pub fn key(&self) -> String {
        format!("{}({})", self.name, self.param_kinds.join(","))
    }

    /// Naming style bucket for the consistency heuristic.
    pub fn naming_style(&self) -> Option<&'static str> {
        naming_style(&self.name)
    }
}

/// Normalized class shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassShape {
    pub name: String,
    pub bases: Vec<String>,
    /// Well-known lifecycle methods the class overrides.
    pub overrides: Vec<String>,
}

/// Normalized error-handling shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerShape {
    /// Caught exception types, sorted.
    pub caught: Vec<String>,
    /// Catches everything (bare except / Exception / BaseException).
    pub broad: bool,
    /// Re-raises inside the handler.
    pub rethrows: bool,
}

impl HandlerShape {
    pub fn key(&self) -> String {
        format!(
            "catch[{}]{}{}",
            self.caught.join(","),
            if self.broad { "+broad" } else { "" },
            if self.rethrows { "+rethrow" } else { "" },
        )
    }
}

/// A security anti-pattern site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecuritySite {
    /// "sql_concat" or "unchecked_path_join".
    pub kind: &'static str,
    pub line: i64,
    pub snippet: String,
}

/// A performance anti-pattern site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerfSite {
    /// "nested_loop_io" or "repeated_query_in_loop".
    pub kind: &'static str,
    pub line: i64,
    pub snippet: String,
}

/// Everything extracted from one source file.
#[derive(Debug, Clone, Default)]
pub struct SourceShapes {
    pub language: &'static str,
    /// 1.0 for AST-backed extraction, lower for regex fallbacks.
    pub extraction_confidence: f64,
    pub functions: Vec<FunctionShape>,
    pub classes: Vec<ClassShape>,
    pub handlers: Vec<HandlerShape>,
    pub imports: Vec<String>,
    pub security_sites: Vec<SecuritySite>,
    pub perf_sites: Vec<PerfSite>,
}

/// Extract shapes for a file, dispatching on extension.
pub fn extract_shapes(path: &str, source: &str) -> SourceShapes {
    if source.len() > MAX_ANALYZED_BYTES {
        debug!(path, bytes = source.len(), "skipping oversized file");
        return SourceShapes::default();
    }

    let mut shapes = match extension(path) {
        "py" => extract_python(source),
        "ts" | "tsx" | "js" | "jsx" => extract_regex_js(source),
        "go" => extract_regex_go(source),
        "rs" => extract_regex_rust(source),
        _ => SourceShapes::default(),
    };

    // The shape probes are language-agnostic line scans.
    shapes.security_sites = scan_security_sites(source);
    shapes.perf_sites = scan_perf_sites(source);
    shapes
}

fn extension(path: &str) -> &str {
    path.rsplit('.').next().unwrap_or("")
}

/// Whether a path looks like a test file by naming convention.
pub fn is_test_path(path: &str) -> bool {
    let lower = path.to_lowercase();
    let name = lower.rsplit('/').next().unwrap_or(&lower);
    lower.contains("/tests/")
        || lower.contains("/test/")
        || lower.starts_with("tests/")
        || name.starts_with("test_")
        || name.ends_with("_test.rs")
        || name.ends_with("_test.go")
        || name.ends_with("_test.py")
        || name.ends_with(".test.ts")
        || name.ends_with(".test.js")
        || name.ends_with(".spec.ts")
        || name.ends_with(".spec.js")
}

/// Whether a path is source code the analyzers care about.
pub fn is_source_path(path: &str) -> bool {
    matches!(
        extension(path),
        "py" | "ts" | "tsx" | "js" | "jsx" | "go" | "rs"
    )
}

fn naming_style(name: &str) -> Option<&'static str> {
    let has_underscore = name.contains('_');
    let has_camel_hump = name
        .as_bytes()
        .windows(2)
        .any(|w| w[0].is_ascii_lowercase() && w[1].is_ascii_uppercase());
    match (has_underscore, has_camel_hump) {
        (true, false) => Some("snake_case"),
        (false, true) => Some("camelCase"),
        _ => None,
    }
}

// --- Python via tree-sitter ---

const WELL_KNOWN_OVERRIDES: &[&str] = &[
    "__init__",
    "__enter__",
    "__exit__",
    "__str__",
    "__repr__",
    "setUp",
    "tearDown",
];

fn extract_python(source: &str) -> SourceShapes {
    let mut shapes = SourceShapes {
        language: "python",
        extraction_confidence: 1.0,
        ..Default::default()
    };

    let mut parser = tree_sitter::Parser::new();
    if parser.set_language(tree_sitter_python::language()).is_err() {
        return shapes;
    }
    let Some(tree) = parser.parse(source, None) else {
        return shapes;
    };

    let bytes = source.as_bytes();
    walk_python(tree.root_node(), bytes, &mut shapes, None);
    shapes
}

fn walk_python(
    node: tree_sitter::Node<'_>,
    source: &[u8],
    shapes: &mut SourceShapes,
    enclosing_class: Option<&str>,
) {
    match node.kind() {
        "function_definition" => {
            if let Some(shape) = python_function_shape(node, source) {
                if let Some(class_name) = enclosing_class {
                    if WELL_KNOWN_OVERRIDES.contains(&shape.name.as_str()) {
                        if let Some(class) = shapes
                            .classes
                            .iter_mut()
                            .find(|c| c.name == class_name)
                        {
                            class.overrides.push(shape.name.clone());
                        }
                    }
                }
                shapes.functions.push(shape);
            }
        }
        "class_definition" => {
            let name = node
                .child_by_field_name("name")
                .and_then(|n| n.utf8_text(source).ok())
                .unwrap_or("")
                .to_string();
            let mut bases = Vec::new();
            if let Some(args) = node.child_by_field_name("superclasses") {
                let mut cursor = args.walk();
                for child in args.children(&mut cursor) {
                    if child.kind() == "identifier" || child.kind() == "attribute" {
                        if let Ok(text) = child.utf8_text(source) {
                            bases.push(text.to_string());
                        }
                    }
                }
            }
            shapes.classes.push(ClassShape {
                name: name.clone(),
                bases,
                overrides: Vec::new(),
            });

            // Recurse with the class context; skip the generic recursion.
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                walk_python(child, source, shapes, Some(&name));
            }
            return;
        }
        "except_clause" => {
            shapes.handlers.push(python_handler_shape(node, source));
        }
        "import_statement" | "import_from_statement" => {
            if let Ok(text) = node.utf8_text(source) {
                shapes.imports.push(normalize_ws(text));
            }
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk_python(child, source, shapes, enclosing_class);
    }
}

fn python_function_shape(
    node: tree_sitter::Node<'_>,
    source: &[u8],
) -> Option<FunctionShape> {
    let name = node
        .child_by_field_name("name")?
        .utf8_text(source)
        .ok()?
        .to_string();
    let mut param_kinds = Vec::new();
    if let Some(params) = node.child_by_field_name("parameters") {
        let mut cursor = params.walk();
        for child in params.children(&mut cursor) {
            let kind = match child.kind() {
                "identifier" | "typed_parameter" => "plain",
                "default_parameter" | "typed_default_parameter" => "default",
                "list_splat_pattern" => "vararg",
                "dictionary_splat_pattern" => "kwarg",
                _ => continue,
            };
            // Skip the conventional receiver.
            if child.kind() == "identifier"
                && matches!(child.utf8_text(source), Ok("self") | Ok("cls"))
            {
                continue;
            }
            param_kinds.push(kind.to_string());
        }
    }
    Some(FunctionShape {
        name,
        arity: param_kinds.len(),
        param_kinds,
    })
}

fn python_handler_shape(node: tree_sitter::Node<'_>, source: &[u8]) -> HandlerShape {
    let mut caught: Vec<String> = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        // Anything after `as` is the binding alias, not a caught type.
        if child.kind() == "as" {
            break;
        }
        match child.kind() {
            "identifier" | "attribute" => {
                if let Ok(text) = child.utf8_text(source) {
                    caught.push(text.to_string());
                }
            }
            "tuple" => {
                let mut inner = child.walk();
                for item in child.children(&mut inner) {
                    if item.kind() == "identifier" || item.kind() == "attribute" {
                        if let Ok(text) = item.utf8_text(source) {
                            caught.push(text.to_string());
                        }
                    }
                }
            }
            _ => {}
        }
    }
    caught.sort();
    let broad = caught.is_empty()
        || caught
            .iter()
            .any(|c| c == "Exception" || c == "BaseException");
    let rethrows = node
        .utf8_text(source)
        .map(|text| {
            text.lines()
                .any(|l| l.trim() == "raise" || l.trim().starts_with("raise "))
        })
        .unwrap_or(false);
    HandlerShape {
        caught,
        broad,
        rethrows,
    }
}

fn normalize_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// --- Regex fallbacks ---

fn js_regexes() -> &'static (Regex, Regex, Regex, Regex) {
    static RE: OnceLock<(Regex, Regex, Regex, Regex)> = OnceLock::new();
    RE.get_or_init(|| {
        (
            Regex::new(r"(?m)^\s*(?:export\s+)?(?:async\s+)?function\s+(\w+)\s*\(([^)]*)\)")
                .unwrap(),
            Regex::new(r"(?m)^\s*(?:export\s+)?(?:const|let|var)\s+(\w+)\s*=\s*(?:async\s+)?\(([^)]*)\)\s*=>")
                .unwrap(),
            Regex::new(r"(?m)^\s*(?:export\s+)?class\s+(\w+)(?:\s+extends\s+([\w.]+))?").unwrap(),
            Regex::new(r#"(?m)^\s*import\s+.+?\s+from\s+['"]([^'"]+)['"]"#).unwrap(),
        )
    })
}

fn extract_regex_js(source: &str) -> SourceShapes {
    let (func_re, arrow_re, class_re, import_re) = js_regexes();
    let mut shapes = SourceShapes {
        language: "javascript",
        extraction_confidence: 0.6,
        ..Default::default()
    };

    for caps in func_re.captures_iter(source) {
        shapes.functions.push(regex_function(&caps[1], &caps[2]));
    }
    for caps in arrow_re.captures_iter(source) {
        shapes.functions.push(regex_function(&caps[1], &caps[2]));
    }
    for caps in class_re.captures_iter(source) {
        shapes.classes.push(ClassShape {
            name: caps[1].to_string(),
            bases: caps.get(2).map(|m| vec![m.as_str().to_string()]).unwrap_or_default(),
            overrides: Vec::new(),
        });
    }
    for caps in import_re.captures_iter(source) {
        shapes.imports.push(format!("import {}", &caps[1]));
    }
    shapes
}

fn go_regexes() -> &'static (Regex, Regex) {
    static RE: OnceLock<(Regex, Regex)> = OnceLock::new();
    RE.get_or_init(|| {
        (
            Regex::new(r"(?m)^func\s+(?:\([^)]*\)\s+)?(\w+)\s*\(([^)]*)\)").unwrap(),
            Regex::new(r#"(?m)^\s*(?:import\s+)?"([\w./-]+)"$"#).unwrap(),
        )
    })
}

fn extract_regex_go(source: &str) -> SourceShapes {
    let (func_re, import_re) = go_regexes();
    let mut shapes = SourceShapes {
        language: "go",
        extraction_confidence: 0.6,
        ..Default::default()
    };
    for caps in func_re.captures_iter(source) {
        shapes.functions.push(regex_function(&caps[1], &caps[2]));
    }
    for caps in import_re.captures_iter(source) {
        shapes.imports.push(format!("import {}", &caps[1]));
    }
    shapes
}

fn rust_regexes() -> &'static (Regex, Regex, Regex) {
    static RE: OnceLock<(Regex, Regex, Regex)> = OnceLock::new();
    RE.get_or_init(|| {
        (
            Regex::new(r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?fn\s+(\w+)\s*(?:<[^>]*>)?\s*\(([^)]*)\)")
                .unwrap(),
            Regex::new(r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?(?:struct|enum|trait)\s+(\w+)").unwrap(),
            Regex::new(r"(?m)^\s*use\s+([\w:]+)").unwrap(),
        )
    })
}

fn extract_regex_rust(source: &str) -> SourceShapes {
    let (func_re, type_re, use_re) = rust_regexes();
    let mut shapes = SourceShapes {
        language: "rust",
        extraction_confidence: 0.6,
        ..Default::default()
    };
    for caps in func_re.captures_iter(source) {
        shapes.functions.push(regex_function(&caps[1], &caps[2]));
    }
    for caps in type_re.captures_iter(source) {
        shapes.classes.push(ClassShape {
            name: caps[1].to_string(),
            bases: Vec::new(),
            overrides: Vec::new(),
        });
    }
    for caps in use_re.captures_iter(source) {
        shapes.imports.push(format!("use {}", &caps[1]));
    }
    shapes
}

fn regex_function(name: &str, params: &str) -> FunctionShape {
    let param_kinds: Vec<String> = params
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty() && *p != "self" && *p != "&self" && *p != "&mut self")
        .map(|p| {
            if p.contains('=') {
                "default".to_string()
            } else {
                "plain".to_string()
            }
        })
        .collect();
    FunctionShape {
        name: name.to_string(),
        arity: param_kinds.len(),
        param_kinds,
    }
}

// --- Security and performance probes (language-agnostic line scans) ---

fn security_regexes() -> &'static (Regex, Regex, Regex) {
    static RE: OnceLock<(Regex, Regex, Regex)> = OnceLock::new();
    RE.get_or_init(|| {
        (
            // String-assembled SQL: a quoted SQL verb followed by concatenation.
            Regex::new(r#"(?i)["'](?:select|insert|update|delete)\b[^"']*["']\s*(?:\+|%|\|\|)"#)
                .unwrap(),
            // Interpolated SQL: f-strings and format!/format() with a SQL verb.
            Regex::new(r#"(?i)(?:f["']|format!?\s*\(\s*["'])(?:select|insert|update|delete)\b[^"']*\{"#)
                .unwrap(),
            // User-controlled input flowing into a path join or open.
            Regex::new(r"(?i)(?:path\.join|os\.path\.join|open)\s*\([^)]*(?:request|params|input|args|query)")
                .unwrap(),
        )
    })
}

/// Scan for recognizable security anti-patterns.
pub fn scan_security_sites(source: &str) -> Vec<SecuritySite> {
    let (concat_re, interp_re, path_re) = security_regexes();
    let mut sites = Vec::new();
    for (idx, line) in source.lines().enumerate() {
        let line_no = idx as i64 + 1;
        if concat_re.is_match(line) || interp_re.is_match(line) {
            sites.push(SecuritySite {
                kind: "sql_concat",
                line: line_no,
                snippet: line.trim().to_string(),
            });
        }
        if path_re.is_match(line) {
            sites.push(SecuritySite {
                kind: "unchecked_path_join",
                line: line_no,
                snippet: line.trim().to_string(),
            });
        }
    }
    sites
}

fn perf_regexes() -> &'static (Regex, Regex, Regex) {
    static RE: OnceLock<(Regex, Regex, Regex)> = OnceLock::new();
    RE.get_or_init(|| {
        (
            Regex::new(r"(?m)^(\s*)(?:for|while)\b").unwrap(),
            Regex::new(r"(?i)\b(?:open|fetch|request|query|execute|read_to_string|write|send)\s*\(")
                .unwrap(),
            Regex::new(r#"(?i)\.(?:execute|query)\s*\(\s*(["'][^"']+["'])"#).unwrap(),
        )
    })
}

/// Scan for nested-loop-IO and repeated-identical-query shapes.
///
/// Nesting is tracked by indentation, which is exact for Python and a fair
/// approximation for brace languages formatted conventionally.
pub fn scan_perf_sites(source: &str) -> Vec<PerfSite> {
    let (loop_re, io_re, query_re) = perf_regexes();
    let mut sites = Vec::new();

    // Stack of loop indentation depths.
    let mut loop_stack: Vec<usize> = Vec::new();
    let mut queries_in_loop: std::collections::HashMap<String, (i64, usize)> =
        std::collections::HashMap::new();

    for (idx, line) in source.lines().enumerate() {
        let line_no = idx as i64 + 1;
        if line.trim().is_empty() {
            continue;
        }
        let indent = line.len() - line.trim_start().len();

        // Pop loops we have dedented out of.
        while let Some(&top) = loop_stack.last() {
            if indent <= top && !loop_re.is_match(line) {
                loop_stack.pop();
                if loop_stack.is_empty() {
                    queries_in_loop.clear();
                }
            } else {
                break;
            }
        }

        if let Some(caps) = loop_re.captures(line) {
            let depth = caps[1].len();
            while loop_stack.last().is_some_and(|&top| depth <= top) {
                loop_stack.pop();
            }
            loop_stack.push(depth);
            continue;
        }

        if loop_stack.len() >= 2 && io_re.is_match(line) {
            sites.push(PerfSite {
                kind: "nested_loop_io",
                line: line_no,
                snippet: line.trim().to_string(),
            });
        }

        if !loop_stack.is_empty() {
            if let Some(caps) = query_re.captures(line) {
                let literal = caps[1].to_string();
                let entry = queries_in_loop.entry(literal).or_insert((line_no, 0));
                entry.1 += 1;
                if entry.1 == 2 {
                    sites.push(PerfSite {
                        kind: "repeated_query_in_loop",
                        line: entry.0,
                        snippet: line.trim().to_string(),
                    });
                }
            }
        }
    }
    sites
}
