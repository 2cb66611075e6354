//! Marshal code generator
//!
//! Turns a template of `#marshal` blocks into two Rust source units:
//! - the interface unit: header code and one struct per record
//! - the implementation unit: `Marshal`/`Unmarshal` impls per record
//!
//! Both units are parsed with `syn` before they are returned, so a template
//! that produces invalid Rust is reported here rather than by the compiler.

pub mod emit;
pub mod template;

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use proc_macro2::TokenStream;
use quote::{ToTokens, quote};

use crate::error::{NgcsError, Result};

pub use template::{FieldDef, FieldKind, RecordDef, Template};

/// Generator options.
#[derive(Debug, Clone)]
pub struct Options {
    /// Path generated code uses to reach this crate.
    pub crate_path: String,
    /// Module the implementation unit imports record types from. `None` when
    /// both units are included into the same module.
    pub types_path: Option<String>,
    /// Template name recorded in the banner.
    pub source_name: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            crate_path: "::ngcs".to_string(),
            types_path: None,
            source_name: "template".to_string(),
        }
    }
}

/// Generated source text.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedUnits {
    pub interface: String,
    pub implementation: String,
}

/// Generate both units from template source.
pub fn generate(source: &str, options: &Options) -> Result<GeneratedUnits> {
    let template = template::parse(source)?;
    let krate = parse_path(&options.crate_path, "crate path")?;
    debug!(
        "Parsed {} record(s) from {}",
        template.records.len(),
        options.source_name
    );

    if let Some(header) = &template.header {
        syn::parse_file(&header.text).map_err(|e| NgcsError::Template {
            line: header.line,
            message: format!("header code is not valid Rust: {}", e),
        })?;
    }

    let banner = format!(
        "// @generated by ngcs-gen from {}. Do not edit.\n",
        options.source_name
    );

    let interface = render(
        &banner,
        template.header.as_ref().map(|header| header.text.as_str()),
        &emit::interface_items(&template.records),
    );

    let mut implementation_items = Vec::new();
    if let Some(types_path) = &options.types_path
        && !template.records.is_empty()
    {
        let types = parse_path(types_path, "types path")?;
        implementation_items.push(quote! { use #types::*; });
    }
    implementation_items.extend(emit::implementation_items(&template.records, &krate));
    let implementation = render(&banner, None, &implementation_items);

    validate("interface", &interface)?;
    validate("implementation", &implementation)?;

    Ok(GeneratedUnits {
        interface,
        implementation,
    })
}

/// Output file names for a template path: `<stem>_types.rs`, `<stem>_marshal.rs`.
pub fn output_paths(template: &Path, out_dir: &Path) -> (PathBuf, PathBuf) {
    let stem = template
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "generated".to_string());
    (
        out_dir.join(format!("{}_types.rs", stem)),
        out_dir.join(format!("{}_marshal.rs", stem)),
    )
}

/// Generate from a template file and write both units into `out_dir`.
pub fn generate_file(template: &Path, out_dir: &Path, options: &Options) -> Result<(PathBuf, PathBuf)> {
    let source = fs::read_to_string(template)?;
    let units = generate(&source, options)?;
    let (interface_path, implementation_path) = output_paths(template, out_dir);

    fs::create_dir_all(out_dir)?;
    fs::write(&interface_path, units.interface)?;
    fs::write(&implementation_path, units.implementation)?;
    info!(
        "Generated {} and {}",
        interface_path.display(),
        implementation_path.display()
    );
    Ok((interface_path, implementation_path))
}

fn parse_path(text: &str, what: &str) -> Result<TokenStream> {
    let path: syn::Path = syn::parse_str(text).map_err(|e| NgcsError::Template {
        line: 0,
        message: format!("invalid {} `{}`: {}", what, text, e),
    })?;
    Ok(path.into_token_stream())
}

fn render(banner: &str, header: Option<&str>, items: &[TokenStream]) -> String {
    let mut out = String::from(banner);
    if let Some(header) = header {
        out.push('\n');
        out.push_str(header);
    }
    for item in items {
        out.push('\n');
        out.push_str(&item.to_string());
        out.push('\n');
    }
    out
}

fn validate(unit: &str, source: &str) -> Result<()> {
    syn::parse_file(source)
        .map(|_| ())
        .map_err(|e| NgcsError::Template {
            line: 0,
            message: format!("generated {} unit does not parse: {}", unit, e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "\
#header-code
pub const EXIT_SIGNALED: i32 = 128;
#end-header-code

#marshal Exit
int code
int signal
#end-marshal

#marshal Service
string name
Exit exit
Exit* parent
#end-marshal
";

    #[test]
    fn test_generate_units() {
        let units = generate(SOURCE, &Options::default()).unwrap();

        assert!(units.interface.starts_with("// @generated by ngcs-gen from template."));
        assert!(units.interface.contains("pub const EXIT_SIGNALED: i32 = 128;"));
        let interface = syn::parse_file(&units.interface).unwrap();
        // header const + two structs
        assert_eq!(interface.items.len(), 3);

        let implementation = syn::parse_file(&units.implementation).unwrap();
        assert_eq!(implementation.items.len(), 4);
        assert!(units.implementation.contains(":: ngcs :: marshal :: Marshal"));
    }

    #[test]
    fn test_types_path_import() {
        let options = Options {
            types_path: Some("super::service_types".to_string()),
            ..Options::default()
        };
        let units = generate(SOURCE, &options).unwrap();
        let implementation = syn::parse_file(&units.implementation).unwrap();
        assert!(matches!(implementation.items[0], syn::Item::Use(_)));
        assert_eq!(implementation.items.len(), 5);
    }

    #[test]
    fn test_invalid_header_code() {
        let source = "\n#header-code\npub fn broken( {\n#end-header-code\n";
        match generate(source, &Options::default()) {
            Err(NgcsError::Template { line, message }) => {
                assert_eq!(line, 2);
                assert!(message.contains("header code"));
            }
            other => panic!("expected template error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_crate_path() {
        let options = Options {
            crate_path: "not a path".to_string(),
            ..Options::default()
        };
        assert!(matches!(
            generate(SOURCE, &options),
            Err(NgcsError::Template { line: 0, .. })
        ));
    }

    #[test]
    fn test_output_paths() {
        let (types, marshal) = output_paths(Path::new("defs/service.ngcs"), Path::new("out"));
        assert_eq!(types, PathBuf::from("out/service_types.rs"));
        assert_eq!(marshal, PathBuf::from("out/service_marshal.rs"));
    }

    #[test]
    fn test_generate_file_writes_both_units() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("svc.ngcs");
        fs::write(&template, SOURCE).unwrap();

        let out_dir = dir.path().join("gen");
        let (types, marshal) = generate_file(&template, &out_dir, &Options::default()).unwrap();
        assert!(fs::read_to_string(types).unwrap().contains("pub struct Service"));
        assert!(fs::read_to_string(marshal).unwrap().contains("Unmarshal for Service"));
    }
}
