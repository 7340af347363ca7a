use std::path::Path;

use gpubridge_abi::names::{exports, imports, IMPORT_MODULE, MEMORY_EXPORT};
use wasmtime::{Engine, Module};

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStatus {
    Provided,
    /// Under `env` but not a host import.
    Unknown,
    /// Some other import module; instantiation will fail.
    Foreign,
}

#[derive(Debug, Default)]
pub struct Inspection {
    pub imports: Vec<(String, String, ImportStatus)>,
    pub has_memory: bool,
    /// Callback and input exports, with whether the guest has them.
    pub callbacks: Vec<(&'static str, bool)>,
    pub input: Vec<(&'static str, bool)>,
    pub entry_points: Vec<(String, bool)>,
}

impl Inspection {
    pub fn unresolved(&self) -> usize {
        self.imports
            .iter()
            .filter(|(_, _, status)| *status != ImportStatus::Provided)
            .count()
    }
}

pub fn inspect(module: &Module, config: &Config) -> Inspection {
    let exported: Vec<&str> = module.exports().map(|e| e.name()).collect();
    let has = |name: &str| exported.iter().any(|e| *e == name);

    let imports = module
        .imports()
        .map(|import| {
            let status = if import.module() != IMPORT_MODULE {
                ImportStatus::Foreign
            } else if imports::ALL.contains(&import.name()) {
                ImportStatus::Provided
            } else {
                ImportStatus::Unknown
            };
            (import.module().to_string(), import.name().to_string(), status)
        })
        .collect();

    Inspection {
        imports,
        has_memory: has(MEMORY_EXPORT),
        callbacks: exports::CALLBACKS.iter().map(|&name| (name, has(name))).collect(),
        input: exports::INPUT.iter().map(|&name| (name, has(name))).collect(),
        entry_points: [&config.run.init_export, &config.run.frame_export]
            .into_iter()
            .map(|name| (name.clone(), has(name.as_str())))
            .collect(),
    }
}

pub fn run(wasm: &Path, config: &Config) -> anyhow::Result<()> {
    let engine = Engine::default();
    let module = Module::from_file(&engine, wasm)
        .map_err(|e| anyhow::anyhow!("Could not load {}: {e:#}", wasm.display()))?;
    let report = inspect(&module, config);

    println!("{}", wasm.display());
    println!("\nImports ({}):", report.imports.len());
    for (module, name, status) in &report.imports {
        let mark = match status {
            ImportStatus::Provided => "ok",
            ImportStatus::Unknown => "not provided",
            ImportStatus::Foreign => "foreign module",
        };
        println!("  {module}.{name:<42} {mark}");
    }

    println!("\nExports:");
    let yes_no = |present: bool| if present { "present" } else { "missing" };
    println!("  {MEMORY_EXPORT:<45} {}", yes_no(report.has_memory));
    for (name, present) in report
        .entry_points
        .iter()
        .map(|(n, p)| (n.as_str(), *p))
        .chain(report.callbacks.iter().copied())
        .chain(report.input.iter().copied())
    {
        println!("  {name:<45} {}", yes_no(present));
    }

    let unresolved = report.unresolved();
    if unresolved > 0 {
        anyhow::bail!("{unresolved} import(s) cannot be satisfied by this host");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUEST: &str = r#"
        (module
          (import "env" "request_adapter" (func))
          (import "env" "log_string" (func (param i32 i32)))
          (import "env" "draw_sprites" (func))
          (import "wasi_snapshot_preview1" "fd_write" (func (param i32 i32 i32 i32) (result i32)))
          (memory (export "memory") 1)
          (func (export "receive_adapter") (param i32 i32))
          (func (export "on_key_event") (param i32 i32))
          (func (export "frame") (param f64)))
    "#;

    #[test]
    fn test_inspect_classifies_imports() {
        let engine = Engine::default();
        let module = Module::new(&engine, GUEST).unwrap();
        let report = inspect(&module, &Config::default());

        let status = |name: &str| {
            report
                .imports
                .iter()
                .find(|(_, n, _)| n == name)
                .map(|(_, _, s)| *s)
                .unwrap()
        };
        assert_eq!(status("request_adapter"), ImportStatus::Provided);
        assert_eq!(status("log_string"), ImportStatus::Provided);
        assert_eq!(status("draw_sprites"), ImportStatus::Unknown);
        assert_eq!(status("fd_write"), ImportStatus::Foreign);
        assert_eq!(report.unresolved(), 2);
    }

    #[test]
    fn test_inspect_exports() {
        let engine = Engine::default();
        let module = Module::new(&engine, GUEST).unwrap();
        let report = inspect(&module, &Config::default());

        assert!(report.has_memory);
        assert!(report.callbacks.contains(&("receive_adapter", true)));
        assert!(report.callbacks.contains(&("receive_device", false)));
        assert!(report.input.contains(&("on_key_event", true)));
        assert_eq!(
            report.entry_points,
            vec![("init".to_string(), false), ("frame".to_string(), true)]
        );
    }
}
