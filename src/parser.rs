use crate::error::{Error, Result as LoadResult};
use anyhow::{Context, Result};
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};

/// Loads Rust source files into syntax trees.
///
/// Spans keep their line and column information, which the program model uses to map
/// identifier use-sites to the bindings they refer to.
///
/// # Example
///
/// ```no_run
/// use route_surface::parser::AstParser;
/// use std::path::Path;
///
/// let parsed = AstParser::parse_file(Path::new("src/main.rs")).unwrap();
/// println!("Parsed {} items", parsed.syntax_tree.items.len());
/// ```
pub struct AstParser;

/// A parsed Rust file.
#[derive(Debug)]
pub struct ParsedFile {
    /// Path to the source file
    pub path: PathBuf,
    pub syntax_tree: syn::File,
}

impl AstParser {
    /// Reads and parses one file.
    ///
    /// # Arguments
    ///
    /// * `path` - Rust source file to parse
    ///
    /// # Returns
    ///
    /// The file path together with its `syn` syntax tree.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or is not valid Rust syntax.
    pub fn parse_file(path: &Path) -> Result<ParsedFile> {
        debug!("Parsing file: {}", path.display());

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;

        let syntax_tree = syn::parse_file(&content)
            .with_context(|| format!("Failed to parse Rust syntax in file: {}", path.display()))?;

        Ok(ParsedFile {
            path: path.to_path_buf(),
            syntax_tree,
        })
    }

    /// Parses every file, keeping one result per path.
    pub fn parse_files(paths: &[PathBuf]) -> Vec<Result<ParsedFile>> {
        debug!("Parsing {} files", paths.len());
        paths.iter().map(|path| Self::parse_file(path)).collect()
    }

    /// Loads the whole program.
    ///
    /// # Arguments
    ///
    /// * `paths` - Source files, usually straight from the scanner
    /// * `lenient` - Drop files that fail to load instead of aborting
    ///
    /// # Errors
    ///
    /// Returns [`Error::LoadError`] naming the first file that cannot be read or parsed, unless
    /// `lenient` is set, in which case that file is dropped with a warning.
    pub fn load(paths: &[PathBuf], lenient: bool) -> LoadResult<Vec<ParsedFile>> {
        let mut parsed = Vec::with_capacity(paths.len());
        for (path, result) in paths.iter().zip(Self::parse_files(paths)) {
            match result {
                Ok(file) => parsed.push(file),
                Err(e) if lenient => warn!("Skipping {}: {:#}", path.display(), e),
                Err(e) => {
                    return Err(Error::LoadError {
                        file: path.clone(),
                        message: format!("{:#}", e),
                    })
                }
            }
        }

        debug!(
            "Loaded {} of {} files",
            parsed.len(),
            paths.len()
        );
        Ok(parsed)
    }
}
