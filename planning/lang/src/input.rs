use arcstr::ArcStr;

/// Source text of a parsed file. Cloning is cheap: the text is shared by all spans pointing into it.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Input {
    pub(crate) text: ArcStr,
    /// Path of the file the text was read from, if any.
    pub(crate) source: Option<ArcStr>,
}

impl Input {
    pub fn from_string(input: impl ToString) -> Input {
        Input {
            text: ArcStr::from(input.to_string()),
            source: None,
        }
    }

    pub fn from_file(file: &std::path::Path) -> std::result::Result<Input, std::io::Error> {
        let s = std::fs::read_to_string(file)?;
        Ok(Input {
            text: ArcStr::from(s),
            source: Some(ArcStr::from(file.display().to_string())),
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }
}

impl From<&str> for Input {
    fn from(s: &str) -> Self {
        Input::from_string(s)
    }
}

impl TryFrom<&std::path::Path> for Input {
    type Error = std::io::Error;

    fn try_from(path: &std::path::Path) -> Result<Self, Self::Error> {
        Input::from_file(path)
    }
}
