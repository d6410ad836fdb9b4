//! File-level save and load of serialized assets.
//!
//! Saving never leaves a partial file behind: the graph is written to a
//! sibling temporary file, which is renamed over the target only once the
//! write has fully succeeded.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::{OutputConfig, PipelineConfig};
use crate::error::SerializeError;
use crate::field::FieldValue;
use crate::format::Format;
use crate::graph::{GraphSerializer, Loaded};
use crate::token::TokenWriter;
use crate::token::binary::{BinaryReader, BinaryWriter};
use crate::token::text::{TextReader, TextWriter};

pub struct AssetPipeline<'r> {
    serializer: GraphSerializer<'r>,
    output: OutputConfig,
}

impl AssetPipeline<'static> {
    /// A pipeline over the global registry with default settings.
    pub fn global() -> Self {
        Self::new(GraphSerializer::global(), &PipelineConfig::default())
    }
}

impl<'r> AssetPipeline<'r> {
    pub fn new(serializer: GraphSerializer<'r>, config: &PipelineConfig) -> Self {
        Self {
            serializer,
            output: config.output.clone(),
        }
    }

    pub fn output(&self) -> &OutputConfig {
        &self.output
    }

    /// `dir/stem` with the extension of the configured default format.
    pub fn asset_path(&self, dir: &Path, stem: &str) -> PathBuf {
        dir.join(stem)
            .with_extension(self.output.extension(self.output.format))
    }

    /// Serialize `root` to `path`, choosing the backend from its extension.
    pub fn save<T: FieldValue>(&self, path: &Path, root: &T) -> Result<(), SerializeError> {
        let format = self.output.format_for(path);
        let temp = temp_path(path);
        log::debug!("Saving {} as {format:?}", path.display());

        let result = self
            .write_file(&temp, format, root)
            .and_then(|()| fs::rename(&temp, path).map_err(SerializeError::from));
        if let Err(e) = &result {
            log::warn!("Failed to save {}: {e}", path.display());
            if let Err(cleanup) = fs::remove_file(&temp) {
                log::trace!("temporary file {} not removed: {cleanup}", temp.display());
            }
        }
        result
    }

    fn write_file<T: FieldValue>(
        &self,
        path: &Path,
        format: Format,
        root: &T,
    ) -> Result<(), SerializeError> {
        let sink = BufWriter::new(File::create(path)?);
        let mut writer: Box<dyn TokenWriter> = match format {
            Format::Binary => Box::new(BinaryWriter::new(sink)),
            Format::Text => Box::new(TextWriter::with_style(sink, self.output.text_style())),
        };
        self.serializer.serialize(writer.as_mut(), root)
    }

    /// Load a `T` from `path`, choosing the backend from its extension.
    pub fn load<T: FieldValue>(&self, path: &Path) -> Result<T, SerializeError> {
        self.load_reported(path).map(|loaded| loaded.value)
    }

    pub fn load_reported<T: FieldValue>(&self, path: &Path) -> Result<Loaded<T>, SerializeError> {
        let source = BufReader::new(File::open(path)?);
        let loaded = match self.output.format_for(path) {
            Format::Binary => self
                .serializer
                .deserialize_reported(&mut BinaryReader::new(source)),
            Format::Text => self
                .serializer
                .deserialize_reported(&mut TextReader::from_reader(source)?),
        }?;
        if !loaded.report.is_clean() {
            log::warn!(
                "Loaded {} with {} unresolved reference(s)",
                path.display(),
                loaded.report.unresolved.len()
            );
        }
        Ok(loaded)
    }
}

/// A sibling of `path` no other save, in this process or another, is using.
fn temp_path(path: &Path) -> PathBuf {
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    let serial = NEXT.fetch_add(1, Ordering::Relaxed);
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{}-{serial}.tmp", std::process::id()));
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_path_is_a_sibling() {
        let temp = temp_path(Path::new("assets/scene.ron"));
        assert_eq!(temp.parent(), Some(Path::new("assets")));
        let name = temp.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("scene.ron."), "{name}");
        assert!(name.ends_with(".tmp"), "{name}");
    }

    #[test]
    fn temp_paths_are_unique_per_save() {
        let target = Path::new("assets/scene.ron");
        assert_ne!(temp_path(target), temp_path(target));
    }
}
