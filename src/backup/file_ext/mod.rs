use derive_more::Display;

pub trait FileExtProvider {
    fn file_ext(&self) -> &'static str;
}

/// The two kinds of files a dump leaves behind.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    #[display("archive")]
    Archive,
    #[display("log")]
    Log,
}

impl FileExtProvider for ArtifactKind {
    fn file_ext(&self) -> &'static str {
        match self {
            ArtifactKind::Archive => "gz",
            ArtifactKind::Log => "log",
        }
    }
}
