//! Filesystem-backed discovery collaborators.
//!
//! `XmlDescriptorParser` reads ORM and JDO descriptors. `SourceAnnotationScanner`
//! finds persistence annotations on top-level Java types in a unit's source
//! roots. Both are pattern based and only understand the shapes persistence
//! descriptors and entity sources actually take.
use anyhow::{anyhow, Context, Result};
use indexmap::IndexSet;
use regex::Regex;
use std::fs;
use std::path::Path;

use crate::locate::{find_files_by_extension, AnnotatedClass, AnnotationQuery, DescriptorParser};
use crate::project::BuildUnit;

const JAVA_SOURCE_EXTENSION: &str = "java";

/// Collects qualified class names from ORM and JDO descriptors.
pub struct XmlDescriptorParser {
    comment: Regex,
    element: Regex,
    mapped_class: Regex,
    listed_class: Regex,
    default_package: Regex,
    jdo_package: Regex,
    jdo_class: Regex,
}

impl XmlDescriptorParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            comment: Regex::new(r"(?s)<!--.*?-->").context("compile comment pattern")?,
            element: Regex::new(r"<[A-Za-z_][\w.:-]*").context("compile element pattern")?,
            mapped_class: Regex::new(concat!(
                r"<(?:entity|mapped-superclass|embeddable)\s",
                r#"(?:[^>]*?\s)?class\s*=\s*["']([^"']+)["']"#,
            ))
            .context("compile mapped class pattern")?,
            listed_class: Regex::new(r"<class>\s*([^<\s]+)\s*</class>")
                .context("compile listed class pattern")?,
            default_package: Regex::new(r"<package>\s*([^<\s]+)\s*</package>")
                .context("compile default package pattern")?,
            jdo_package: Regex::new(
                r#"(?s)<package\b[^>]*?\bname\s*=\s*["']([^"']*)["'][^>]*>(.*?)</package>"#,
            )
            .context("compile jdo package pattern")?,
            jdo_class: Regex::new(r#"<class\b[^>]*?\bname\s*=\s*["']([^"']+)["']"#)
                .context("compile jdo class pattern")?,
        })
    }

    /// Parse descriptor text. Order of first appearance is kept.
    pub fn parse_str(&self, text: &str) -> Result<IndexSet<String>> {
        let text = self.comment.replace_all(text, "");
        if !self.element.is_match(&text) {
            return Err(anyhow!("descriptor has no root element"));
        }
        let open_packages = text.matches("<package ").count() + text.matches("<package\n").count();
        let closed_packages = text.matches("</package>").count();
        if open_packages > closed_packages {
            return Err(anyhow!("unterminated <package> element"));
        }

        let package = self
            .default_package
            .captures(&text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string());
        let qualify = |name: &str| match &package {
            Some(package) if !name.contains('.') => format!("{package}.{name}"),
            _ => name.to_string(),
        };

        let mut names = IndexSet::new();
        for caps in self.mapped_class.captures_iter(&text) {
            names.insert(qualify(caps[1].trim()));
        }
        for caps in self.listed_class.captures_iter(&text) {
            names.insert(caps[1].to_string());
        }
        for package in self.jdo_package.captures_iter(&text) {
            let prefix = package[1].trim();
            for class in self.jdo_class.captures_iter(&package[2]) {
                let name = class[1].trim();
                if prefix.is_empty() {
                    names.insert(name.to_string());
                } else {
                    names.insert(format!("{prefix}.{name}"));
                }
            }
        }
        Ok(names)
    }
}

impl DescriptorParser for XmlDescriptorParser {
    fn parse(&self, path: &Path) -> Result<IndexSet<String>> {
        let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
        let text = String::from_utf8(bytes).with_context(|| format!("decode {}", path.display()))?;
        self.parse_str(&text)
            .with_context(|| format!("parse descriptor {}", path.display()))
    }
}

/// Parsed shape of one Java source file.
#[derive(Debug, Default, PartialEq, Eq)]
struct SourceFacts {
    package: Option<String>,
    imports: Vec<String>,
    /// Top-level types with the annotation names written on them.
    types: Vec<(String, Vec<String>)>,
}

/// Finds annotated top-level types in Java sources.
pub struct SourceAnnotationScanner {
    block_comment: Regex,
    line_comment: Regex,
    package: Regex,
    import: Regex,
    declaration: Regex,
    annotation: Regex,
}

impl SourceAnnotationScanner {
    pub fn new() -> Result<Self> {
        Ok(Self {
            block_comment: Regex::new(r"(?s)/\*.*?\*/")
                .context("compile block comment pattern")?,
            line_comment: Regex::new(r"//[^\n]*").context("compile line comment pattern")?,
            package: Regex::new(r"(?m)^\s*package\s+([\w.]+)\s*;")
                .context("compile package pattern")?,
            import: Regex::new(r"(?m)^\s*import\s+([\w.]+(?:\.\*)?)\s*;")
                .context("compile import pattern")?,
            declaration: Regex::new(concat!(
                r"((?:(?:@[\w.]+|public|protected|private|abstract|final|static|strictfp",
                r"|sealed|non-sealed)\s+)+)(class|interface|enum|record)\s+(\w+)",
            ))
            .context("compile declaration pattern")?,
            annotation: Regex::new(r"@([\w.]+)").context("compile annotation pattern")?,
        })
    }

    fn facts(&self, source: &str) -> SourceFacts {
        let source = self.block_comment.replace_all(source, "");
        let source = self.line_comment.replace_all(&source, "");
        let source = strip_annotation_arguments(&source);

        let package = self
            .package
            .captures(&source)
            .map(|caps| caps[1].to_string());
        let imports = self
            .import
            .captures_iter(&source)
            .map(|caps| caps[1].to_string())
            .collect();

        let mut types = Vec::new();
        for caps in self.declaration.captures_iter(&source) {
            let Some(start) = caps.get(0).map(|m| m.start()) else {
                continue;
            };
            if brace_depth(&source[..start]) != 0 {
                continue;
            }
            let annotations: Vec<String> = self
                .annotation
                .captures_iter(&caps[1])
                .map(|a| a[1].to_string())
                .collect();
            types.push((caps[3].to_string(), annotations));
        }
        SourceFacts {
            package,
            imports,
            types,
        }
    }

    /// Qualified names of annotated top-level types in `source`.
    pub fn annotated_types(&self, source: &str, annotations: &[&str]) -> Vec<String> {
        let facts = self.facts(source);
        facts
            .types
            .iter()
            .filter(|(_, written)| {
                written
                    .iter()
                    .any(|name| annotation_matches(name, annotations, &facts))
            })
            .map(|(type_name, _)| match &facts.package {
                Some(package) => format!("{package}.{type_name}"),
                None => type_name.clone(),
            })
            .collect()
    }
}

impl AnnotationQuery for SourceAnnotationScanner {
    fn find_annotated_classes(
        &self,
        annotations: &[&str],
        unit: &BuildUnit,
        include_tests: bool,
    ) -> Result<Vec<AnnotatedClass>> {
        let mut found = IndexSet::new();
        for root in unit.source_dirs(include_tests) {
            if !root.is_dir() {
                continue;
            }
            for file in find_files_by_extension(root, JAVA_SOURCE_EXTENSION)? {
                let source = fs::read_to_string(&file)
                    .with_context(|| format!("read {}", file.display()))?;
                found.extend(self.annotated_types(&source, annotations));
            }
        }
        tracing::debug!(unit = %unit.name, count = found.len(), "annotated sources");
        Ok(found.into_iter().map(AnnotatedClass::named).collect())
    }
}

/// Drop annotation argument lists, keeping the annotation names. Arguments
/// may nest annotations and hold string literals with parentheses.
fn strip_annotation_arguments(source: &str) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        out.push(ch);
        i += 1;
        if ch != '@' {
            continue;
        }
        while i < chars.len() && is_name_char(chars[i]) {
            out.push(chars[i]);
            i += 1;
        }
        let mut next = i;
        while next < chars.len() && chars[next].is_whitespace() {
            next += 1;
        }
        if chars.get(next) == Some(&'(') {
            i = skip_parenthesized(&chars, next);
            out.push(' ');
        }
    }
    out
}

fn is_name_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '.'
}

/// Index just past the parenthesis that closes the one at `open`.
fn skip_parenthesized(chars: &[char], open: usize) -> usize {
    let mut depth = 0usize;
    let mut quote = None;
    let mut i = open;
    while i < chars.len() {
        let ch = chars[i];
        match quote {
            Some(_) if ch == '\\' => i += 1,
            Some(q) if ch == q => quote = None,
            Some(_) => {}
            None => match ch {
                '"' | '\'' => quote = Some(ch),
                '(' => depth += 1,
                ')' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return i + 1;
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }
    chars.len()
}

fn brace_depth(prefix: &str) -> i64 {
    prefix.chars().fold(0, |depth, ch| match ch {
        '{' => depth + 1,
        '}' => depth - 1,
        _ => depth,
    })
}

fn split_qualified(name: &str) -> (&str, &str) {
    name.rsplit_once('.').unwrap_or(("", name))
}

/// A written annotation matches when it is one of `targets` by qualified
/// name, or by simple name with the target's package visible in the file.
fn annotation_matches(written: &str, targets: &[&str], facts: &SourceFacts) -> bool {
    if written.contains('.') {
        return targets.contains(&written);
    }
    targets.iter().any(|target| {
        let (package, simple) = split_qualified(target);
        simple == written
            && (facts.imports.iter().any(|import| import == target)
                || facts
                    .imports
                    .iter()
                    .any(|import| import.strip_suffix(".*") == Some(package))
                || facts.package.as_deref() == Some(package))
    })
}
