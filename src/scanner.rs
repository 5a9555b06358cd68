use anyhow::{Context, Result};
use log::{debug, warn};
use std::path::PathBuf;
use walkdir::WalkDir;

/// Build output, skipped at any depth.
const SKIPPED_DIRS: &[&str] = &["target"];

/// Integration tests, benches and example binaries of a package. Only skipped next to a
/// `Cargo.toml` or directly under the scanned root; `src/examples/` is ordinary source.
const PACKAGE_DIRS: &[&str] = &["tests", "benches", "examples"];

/// Collects the Rust sources of a project.
///
/// Hidden directories, [`SKIPPED_DIRS`] and package-level [`PACKAGE_DIRS`] are not descended
/// into. Files come back sorted by path so that symbol numbering, and with it the route order,
/// is stable between runs.
///
/// # Example
///
/// ```no_run
/// use route_surface::scanner::FileScanner;
/// use std::path::PathBuf;
///
/// let scanner = FileScanner::new(PathBuf::from("./my-service"));
/// let result = scanner.scan().unwrap();
/// println!("Found {} Rust files", result.rust_files.len());
/// ```
pub struct FileScanner {
    root_path: PathBuf,
}

/// Files found by a scan.
pub struct ScanResult {
    pub rust_files: Vec<PathBuf>,
    /// Entries that could not be accessed
    pub warnings: Vec<String>,
}

impl FileScanner {
    /// # Arguments
    ///
    /// * `root_path` - Project directory to scan
    pub fn new(root_path: PathBuf) -> Self {
        Self { root_path }
    }

    /// Walks the project tree.
    ///
    /// # Returns
    ///
    /// The `.rs` files found, sorted by path, and a warning per entry that could not be accessed.
    ///
    /// # Errors
    ///
    /// Fails when the root itself cannot be read; unreadable entries below it become warnings.
    pub fn scan(&self) -> Result<ScanResult> {
        std::fs::read_dir(&self.root_path)
            .with_context(|| format!("Failed to read directory: {}", self.root_path.display()))?;

        let mut rust_files = Vec::new();
        let mut warnings = Vec::new();

        let walker = WalkDir::new(&self.root_path)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                if e.depth() == 0 || !e.file_type().is_dir() {
                    return true;
                }
                let name = e.file_name().to_string_lossy();
                if name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_ref()) {
                    return false;
                }
                !(PACKAGE_DIRS.contains(&name.as_ref()) && is_package_level(e))
            });

        for entry in walker {
            match entry {
                Ok(entry) => {
                    let path = entry.path();
                    if entry.file_type().is_file()
                        && path.extension().and_then(|s| s.to_str()) == Some("rs")
                    {
                        rust_files.push(path.to_path_buf());
                    }
                }
                Err(e) => {
                    let warning = format!("Failed to access path: {}", e);
                    warn!("{}", warning);
                    warnings.push(warning);
                }
            }
        }

        debug!(
            "Scanned {}: {} Rust files",
            self.root_path.display(),
            rust_files.len()
        );
        Ok(ScanResult {
            rust_files,
            warnings,
        })
    }
}

fn is_package_level(entry: &walkdir::DirEntry) -> bool {
    entry.depth() == 1
        || entry
            .path()
            .parent()
            .map(|parent| parent.join("Cargo.toml").is_file())
            .unwrap_or(false)
}
