use crate::cli::Framework;
use crate::parser::ParsedFile;
use log::debug;
use std::collections::BTreeSet;
use syn::visit::Visit;
use syn::UseTree;

/// Crate names that identify each framework.
const FRAMEWORK_CRATES: &[(&str, Framework)] = &[
    ("axum", Framework::Axum),
    ("actix_web", Framework::ActixWeb),
    ("tide", Framework::Tide),
];

/// Finds the web frameworks a project uses from its `use` items, including the ones inside
/// inline modules and function bodies.
pub struct FrameworkDetector;

/// Frameworks found in a project, in a stable order.
pub struct DetectionResult {
    pub frameworks: Vec<Framework>,
}

impl FrameworkDetector {
    /// Collects the frameworks named by `use` items.
    ///
    /// # Arguments
    ///
    /// * `parsed_files` - Every parsed file of the project
    ///
    /// # Returns
    ///
    /// The detected frameworks, sorted, without duplicates. Empty when none is used.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use route_surface::detector::FrameworkDetector;
    /// use route_surface::parser::AstParser;
    /// use std::path::Path;
    ///
    /// let parsed = AstParser::parse_file(Path::new("src/main.rs")).unwrap();
    /// let result = FrameworkDetector::detect(&[parsed]);
    /// println!("Detected {} framework(s)", result.frameworks.len());
    /// ```
    pub fn detect(parsed_files: &[ParsedFile]) -> DetectionResult {
        debug!("Detecting frameworks in {} files", parsed_files.len());

        let mut visitor = UseVisitor {
            detected: BTreeSet::new(),
        };
        for parsed_file in parsed_files {
            visitor.visit_file(&parsed_file.syntax_tree);
        }

        let frameworks: Vec<Framework> = visitor.detected.into_iter().collect();
        debug!("Detected frameworks: {:?}", frameworks);
        DetectionResult { frameworks }
    }
}

struct UseVisitor {
    detected: BTreeSet<Framework>,
}

impl UseVisitor {
    fn check_use_tree(&mut self, tree: &UseTree) {
        let ident = match tree {
            UseTree::Path(path) => {
                // only the leading segment names a crate
                &path.ident
            }
            UseTree::Rename(rename) => &rename.ident,
            UseTree::Name(name) => &name.ident,
            UseTree::Group(group) => {
                for item in &group.items {
                    self.check_use_tree(item);
                }
                return;
            }
            UseTree::Glob(_) => return,
        };
        let name = ident.to_string();
        if let Some((_, framework)) = FRAMEWORK_CRATES.iter().find(|(krate, _)| *krate == name) {
            self.detected.insert(*framework);
        }
    }
}

impl<'ast> Visit<'ast> for UseVisitor {
    fn visit_item_use(&mut self, node: &'ast syn::ItemUse) {
        self.check_use_tree(&node.tree);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn detect(sources: &[&str]) -> Vec<Framework> {
        let files: Vec<ParsedFile> = sources
            .iter()
            .enumerate()
            .map(|(i, code)| ParsedFile {
                path: PathBuf::from(format!("/proj/src/f{}.rs", i)),
                syntax_tree: syn::parse_file(code).expect("Failed to parse test code"),
            })
            .collect();
        FrameworkDetector::detect(&files).frameworks
    }

    #[test]
    fn test_detect_each_framework() {
        assert_eq!(detect(&["use axum::{routing::get, Router};"]), vec![Framework::Axum]);
        assert_eq!(detect(&["use actix_web::{web, App};"]), vec![Framework::ActixWeb]);
        assert_eq!(detect(&["use tide::Request;"]), vec![Framework::Tide]);
    }

    #[test]
    fn test_detect_is_ordered_and_deduplicated() {
        let frameworks = detect(&[
            "use tide::prelude::*;",
            "use axum::Router; use axum::Json;",
            "use actix_web as web_framework;",
        ]);
        assert_eq!(
            frameworks,
            vec![Framework::Axum, Framework::ActixWeb, Framework::Tide]
        );
    }

    #[test]
    fn test_detect_nested_uses() {
        let frameworks = detect(&[r#"
            mod routes {
                use {serde::Serialize, tide::Server};
            }
            fn main() {
                use std::collections::HashMap;
            }
        "#]);
        assert_eq!(frameworks, vec![Framework::Tide]);
    }

    #[test]
    fn test_detect_ignores_non_leading_segments() {
        assert!(detect(&["use my_crate::axum::Handler; use std::*;"]).is_empty());
    }
}
