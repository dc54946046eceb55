use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

pub use templating::{Template, TemplateWriter};

mod templating;

/// Creates the generated output files and remembers every path it touched so
/// a failed run can remove its partial artifacts.
pub struct GeneratedCodeWriter {
    written: Vec<PathBuf>,
}

impl GeneratedCodeWriter {
    pub fn new() -> Self {
        GeneratedCodeWriter {
            written: Vec::new(),
        }
    }

    /// Open `path`, run the generator against a buffered writer and flush.
    /// The path is recorded before writing starts so that
    /// [`GeneratedCodeWriter::remove_outputs`] also covers a file that
    /// failed halfway through.
    pub fn generate_code<G>(&mut self, path: &Path, generator: G) -> io::Result<()>
    where
        G: FnOnce(&mut dyn Write) -> io::Result<()>,
    {
        self.written.push(path.to_path_buf());
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        generator(&mut writer)?;
        writer.flush()
    }

    /// Remove every file written so far. Missing files are ignored.
    pub fn remove_outputs(&mut self) {
        for path in self.written.drain(..) {
            let _ = std::fs::remove_file(&path);
        }
    }
}

impl Default for GeneratedCodeWriter {
    fn default() -> Self {
        Self::new()
    }
}
