use std::collections::HashMap;
use std::io::{self, Write};

use once_cell::sync::Lazy;
use regex::Regex;

static MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"/\*\{(.*?)\}\*/").unwrap());

/// A source template containing `/*{ key }*/` markers. The marker syntax is
/// a C++ comment so templates stay compilable while being edited.
pub struct Template<'src> {
    source: &'src str,
}

impl<'src> Template<'src> {
    pub fn new(source: &'src str) -> Self {
        Template { source }
    }

    pub fn writer<'writer>(&'src self) -> TemplateWriter<'writer, 'src> {
        TemplateWriter {
            template: self.source,
            substitutions: HashMap::new(),
        }
    }
}

/// One rendering pass over a template. Each marker key is bound to a
/// closure that writes the replacement text directly into the output
/// stream; nothing is buffered in between.
pub struct TemplateWriter<'writer, 'template> {
    template: &'template str,
    substitutions:
        HashMap<&'static str, Box<dyn Fn(&mut dyn Write) -> io::Result<()> + 'writer>>,
}

impl<'writer, 'template> TemplateWriter<'writer, 'template> {
    pub fn substitute<F>(&mut self, key: &'static str, substitution: F)
    where
        F: Fn(&mut dyn Write) -> io::Result<()> + 'writer,
    {
        self.substitutions.insert(key, Box::new(substitution));
    }

    pub fn write(&self, output: &mut dyn Write) -> io::Result<()> {
        let mut last_match = 0;
        for captures in MARKER.captures_iter(self.template) {
            // get(0) is the whole marker, get(1) the key between the braces
            let marker = captures.get(0).expect("capture 0 is the whole match");
            let key = captures.get(1).expect("marker key").as_str().trim();
            output.write_all(self.template[last_match..marker.start()].as_bytes())?;
            let substitution = self.substitutions.get(key).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("no substitution supplied for template key `{}`", key),
                )
            })?;
            substitution(output)?;
            last_match = marker.end();
        }
        output.write_all(self.template[last_match..].as_bytes())
    }
}
