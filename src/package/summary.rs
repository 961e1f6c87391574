use super::PackageReport;
use std::fmt;

/// Up to three names, comma separated, with `...` when there are more.
pub(crate) fn first_three<S: AsRef<str>>(names: &[S]) -> String {
    let shown: Vec<&str> = names.iter().take(3).map(AsRef::as_ref).collect();
    let more = if names.len() > 3 { "..." } else { "" };
    format!("{}{more}", shown.join(", "))
}

impl fmt::Display for PackageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Packaging completed!")?;
        writeln!(f, "Summary:")?;
        writeln!(f, "Successfully packaged: {} layers", self.processed.len())?;
        writeln!(f, "Layer updates prepared: {} layers", self.updates_prepared)?;

        if !self.failed.is_empty() {
            writeln!(f, "Failed: {} layers", self.failed.len())?;
            writeln!(f, "Failed layers: {}", first_three(&self.failed))?;
        }
        if !self.non_packageable.is_empty() {
            writeln!(
                f,
                "Preserved in project (not in GPKG): {} layers",
                self.non_packageable.len()
            )?;
            writeln!(f, "Preserved: {}", first_three(&self.non_packageable))?;
        }

        match &self.embedded {
            Some(embedded) => {
                let file_name = self
                    .container
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                writeln!(f)?;
                writeln!(f, "Project saved successfully!")?;
                writeln!(f, "To load this project later:")?;
                writeln!(f, "1. Open the GeoPackage: {file_name}")?;
                write!(f, "2. Choose project: {}", embedded.name)?;
                if embedded.reduced_compatibility {
                    write!(f, "\n(stored as a plain project document with reduced compatibility)")?;
                }
            }
            None => {
                writeln!(f)?;
                write!(f, "Project saved to: {}", self.container.display())?;
            }
        }

        write!(f, "\n\nPackageable layers now reference the GeoPackage file")?;
        if !self.non_packageable.is_empty() {
            write!(
                f,
                "\nNon-packageable layers (WMS, etc.) preserved with original sources"
            )?;
        }
        Ok(())
    }
}
