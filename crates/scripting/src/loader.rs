//! Script loading pipeline
//!
//! Each script goes through these passes on a [`ParserContext`]:
//!
//! 1. preloading structures, by descriptor order: match, `init`, `preload`
//! 2. every other top-level section in textual order: match, `init`
//! 3. all structures by (priority, textual order): `preload` if not done yet, then `load`
//! 4. same order: `after_load`
//!
//! The script stays current on the context afterwards. Moving the context to
//! the next script (or to none) is the boundary that binds buffered triggers.
//!
//! Host work queued while loading off the main thread is checked afterwards
//! by [`ScriptLoader::run_pending`], which rolls back rejected structures.

use crate::context::{DataRegistry, ParserContext, ScriptInfo, StructureData};
use crate::error::ScriptError;
use crate::host::Host;
use crate::pattern::ParseResult;
use crate::registry::{match_structure, StructureInfo, StructureRegistry};
use crate::structure::Structure;
use skript_config::{Node, SectionNode};
use skript_core::{GenerationCounter, Priority, Result, Script, SkriptError};
use std::any::Any;
use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A script file and its node tree
#[derive(Debug, Clone)]
pub struct ScriptSource {
    pub path: PathBuf,
    pub tree: SectionNode,
}

impl ScriptSource {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        Self::from_text(path, &text)
    }

    pub fn from_text<P: AsRef<Path>>(path: P, text: &str) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let name = path.to_string_lossy().into_owned();
        let tree = SectionNode::parse(&name, text)
            .map_err(|e| SkriptError::InvalidData(format!("{}: {}", path.display(), e)))?;
        Ok(Self { path, tree })
    }
}

/// A structure that passed `init`
pub struct LoadedStructure {
    structure: Box<dyn Structure>,
    key: String,
    line: usize,
    index: usize,
    priority: Priority,
    preloaded: bool,
    loaded: bool,
}

impl LoadedStructure {
    pub fn describe(&self) -> String {
        self.structure.describe()
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }
}

/// Structures of one loaded script, in load order
pub struct LoadedScript {
    pub script: Arc<Script>,
    structures: Vec<LoadedStructure>,
    pub info: ScriptInfo,
    /// Diagnostics reported while loading
    pub errors: usize,
}

impl LoadedScript {
    pub fn structures(&self) -> &[LoadedStructure] {
        &self.structures
    }

    pub fn loaded_count(&self) -> usize {
        self.structures.iter().filter(|s| s.loaded).count()
    }
}

/// Totals over a set of loaded scripts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub scripts: usize,
    pub structures: usize,
    pub triggers: usize,
    pub commands: usize,
    pub functions: usize,
    pub errors: usize,
}

impl LoadSummary {
    pub fn from_scripts(scripts: &[LoadedScript]) -> Self {
        scripts.iter().fold(Self::default(), |mut summary, script| {
            summary.scripts += 1;
            summary.structures += script.loaded_count();
            summary.triggers += script.info.triggers;
            summary.commands += script.info.commands;
            summary.functions += script.info.functions;
            summary.errors += script.errors;
            summary
        })
    }

    pub fn log(&self) {
        tracing::info!(
            "Loaded {} script(s): {} structure(s), {} trigger(s), {} command(s), {} function(s)",
            self.scripts,
            self.structures,
            self.triggers,
            self.commands,
            self.functions
        );
        if self.errors > 0 {
            tracing::warn!("{} error(s) while loading scripts", self.errors);
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".into()
    }
}

/// Run one phase callback, turning a panic into a fatal error
fn guarded<T>(what: &str, f: impl FnOnce() -> crate::Result<T>) -> crate::Result<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(ScriptError::Fatal(format!("{} panicked: {}", what, panic_message(payload)))),
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Preload,
    Load,
    AfterLoad,
    Unload,
}

impl Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::Preload => "preload",
            Phase::Load => "load",
            Phase::AfterLoad => "after_load",
            Phase::Unload => "unload",
        }
    }
}

/// Drives scripts through the structure phases
pub struct ScriptLoader {
    registry: Arc<StructureRegistry>,
    host: Arc<Host>,
    data: DataRegistry,
    generations: GenerationCounter,
}

impl ScriptLoader {
    pub fn new(registry: Arc<StructureRegistry>, host: Arc<Host>) -> Self {
        Self::with_data(registry, host, crate::builtins::default_data())
    }

    pub fn with_data(registry: Arc<StructureRegistry>, host: Arc<Host>, data: DataRegistry) -> Self {
        Self {
            registry,
            host,
            data,
            generations: GenerationCounter::new(),
        }
    }

    pub fn host(&self) -> &Arc<Host> {
        &self.host
    }

    /// A fresh parser context bound to this loader's host
    pub fn new_context(&self) -> ParserContext {
        ParserContext::with_registry(Arc::clone(&self.host), &self.data)
    }

    fn init_structure(
        &self,
        ctx: &mut ParserContext,
        info: &Arc<StructureInfo>,
        result: &ParseResult,
        node: &SectionNode,
        index: usize,
    ) -> Option<LoadedStructure> {
        if let Ok(data) = ctx.data::<StructureData>() {
            data.node = Some(node.clone());
            data.info = Some(Arc::clone(info));
        }

        let mut structure = info.create();
        let outcome = guarded(&node.key, || structure.init(ctx, result, node));

        if let Ok(data) = ctx.data::<StructureData>() {
            data.node = None;
            data.info = None;
        }

        match outcome {
            Ok(true) => Some(LoadedStructure {
                priority: structure.priority(),
                structure,
                key: node.key.clone(),
                line: node.line,
                index,
                preloaded: false,
                loaded: false,
            }),
            Ok(false) => {
                ctx.report(ScriptError::parse(node.line, format!("Can't understand this structure: {}", node.key)));
                None
            }
            Err(e) => {
                ctx.report_at(e, node.line);
                None
            }
        }
    }

    fn run_phase(ctx: &mut ParserContext, loaded: &mut LoadedStructure, phase: Phase) -> bool {
        tracing::trace!("{} {} (line {})", phase.name(), loaded.key, loaded.line);
        let structure = &mut loaded.structure;
        let what = format!("{} of '{}'", phase.name(), loaded.key);
        let result = guarded(&what, || match phase {
            Phase::Preload => structure.preload(ctx),
            Phase::Load => structure.load(ctx),
            Phase::AfterLoad => structure.after_load(ctx),
            Phase::Unload => structure.unload(ctx),
        });
        match result {
            Ok(()) => true,
            Err(e) => {
                ctx.report_at(e, loaded.line);
                false
            }
        }
    }

    /// Load one script
    ///
    /// The previous script of `ctx` (if any) is finished first, which binds
    /// its buffered triggers.
    pub fn load_script(&self, ctx: &mut ParserContext, source: &ScriptSource) -> LoadedScript {
        let generation = self.generations.next();
        let script = Arc::new(Script::new(&source.path, generation));
        ctx.set_current_script(Some(Arc::clone(&script)));
        let reported_before = ctx.diagnostics().len();
        tracing::debug!("Loading {} (generation {})", script, generation.get());

        let mut sections: Vec<(usize, &SectionNode)> = Vec::new();
        for (index, node) in source.tree.iter().enumerate() {
            match node {
                Node::Section(section) => sections.push((index, section)),
                other => ctx.report(ScriptError::parse(
                    other.line(),
                    format!("Can't understand this structure: {}", other.key()),
                )),
            }
        }

        let mut consumed = vec![false; sections.len()];
        let mut structures: Vec<LoadedStructure> = Vec::new();

        for info in self.registry.preloading() {
            for (slot, (index, node)) in sections.iter().enumerate() {
                if consumed[slot] {
                    continue;
                }
                let Some(result) = info.match_expr(&node.key) else {
                    continue;
                };
                consumed[slot] = true;
                if let Some(mut loaded) = self.init_structure(ctx, info, &result, node, *index) {
                    Self::run_phase(ctx, &mut loaded, Phase::Preload);
                    loaded.preloaded = true;
                    structures.push(loaded);
                }
            }
        }

        for (slot, (index, node)) in sections.iter().enumerate() {
            if consumed[slot] {
                continue;
            }
            match match_structure(&node.key, self.registry.normal()) {
                Some(m) => {
                    if let Some(loaded) = self.init_structure(ctx, &m.info, &m.result, node, *index) {
                        structures.push(loaded);
                    }
                }
                None => ctx.report(ScriptError::parse(
                    node.line,
                    format!("Can't understand this structure: {}", node.key),
                )),
            }
        }

        structures.sort_by_key(|s| (s.priority, s.index));

        for loaded in structures.iter_mut() {
            if !loaded.preloaded {
                Self::run_phase(ctx, loaded, Phase::Preload);
                loaded.preloaded = true;
            }
            let ok = Self::run_phase(ctx, loaded, Phase::Load);
            loaded.loaded = ok;
        }

        for loaded in structures.iter_mut().filter(|s| s.loaded) {
            Self::run_phase(ctx, loaded, Phase::AfterLoad);
        }

        ctx.script_info_mut().structures = structures.len();
        let errors = ctx.diagnostics().len() - reported_before;
        let info = ctx.script_info().clone();
        tracing::debug!(
            "Loaded {}: {} structure(s), {} error(s)",
            script,
            structures.len(),
            errors
        );

        LoadedScript {
            script,
            structures,
            info,
            errors,
        }
    }

    /// Load scripts one after the other, then finish the last one
    pub fn load_scripts(&self, ctx: &mut ParserContext, sources: &[ScriptSource]) -> Vec<LoadedScript> {
        let scripts: Vec<LoadedScript> = sources.iter().map(|source| self.load_script(ctx, source)).collect();
        ctx.set_current_script(None);
        LoadSummary::from_scripts(&scripts).log();
        scripts
    }

    /// Load scripts on a blocking worker
    ///
    /// Host mutations are queued for the main thread, which must drain them
    /// with [`ScriptLoader::run_pending`] on the returned context.
    pub async fn load_scripts_async(
        self: &Arc<Self>,
        sources: Vec<ScriptSource>,
    ) -> Result<(ParserContext, Vec<LoadedScript>)> {
        let loader = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            let mut ctx = loader.new_context();
            let scripts = loader.load_scripts(&mut ctx, &sources);
            (ctx, scripts)
        })
        .await
        .map_err(|e| SkriptError::Script(format!("Script loading worker failed: {}", e)))
    }

    /// Run the queued main-thread jobs, then settle every script
    ///
    /// Returns the number of jobs run.
    pub fn run_pending(&self, ctx: &mut ParserContext, scripts: &mut [LoadedScript]) -> usize {
        let ran = self.host.main_thread.run_pending();
        let rejected = self.settle(ctx, scripts);
        if rejected > 0 {
            tracing::warn!("The host rejected {} queued registration(s)", rejected);
        }
        ran
    }

    /// Roll back loaded structures whose queued host work failed
    ///
    /// Each failure is reported against its script and structure line.
    pub fn settle(&self, ctx: &mut ParserContext, scripts: &mut [LoadedScript]) -> usize {
        let mut rejected = 0;
        for loaded in scripts.iter_mut() {
            for structure in loaded.structures.iter_mut().filter(|s| s.loaded) {
                let what = format!("settle of '{}'", structure.key);
                let info = &mut loaded.info;
                let inner = &mut structure.structure;
                if let Err(e) = guarded(&what, || inner.settle(info)) {
                    ctx.set_current_script(Some(Arc::clone(&loaded.script)));
                    ctx.report_at(e, structure.line);
                    structure.loaded = false;
                    loaded.errors += 1;
                    rejected += 1;
                }
            }
        }
        ctx.set_current_script(None);
        rejected
    }

    /// Unload a script: `unload` in reverse load order, for loaded structures only
    ///
    /// A script still current on `ctx` is finished first, so its buffered
    /// triggers are bound before they are unbound.
    pub fn unload_script(&self, ctx: &mut ParserContext, loaded: &mut LoadedScript) {
        ctx.set_current_script(None);
        ctx.set_current_script(Some(Arc::clone(&loaded.script)));
        tracing::debug!("Unloading {}", loaded.script);

        for structure in loaded.structures.iter_mut().rev().filter(|s| s.loaded) {
            Self::run_phase(ctx, structure, Phase::Unload);
            structure.loaded = false;
        }
        loaded.structures.clear();

        ctx.set_current_script(None);
        let leftover = self.host.functions.unregister_script(&loaded.script);
        if leftover > 0 {
            tracing::debug!("Dropped {} function(s) left over by {}", leftover, loaded.script);
        }
    }

    /// Unload a script and load its source again
    pub fn reload_script(&self, ctx: &mut ParserContext, mut loaded: LoadedScript, source: &ScriptSource) -> LoadedScript {
        self.unload_script(ctx, &mut loaded);
        let reloaded = self.load_script(ctx, source);
        ctx.set_current_script(None);
        reloaded
    }

    /// Script files under `folder`, recursively, sorted by path
    ///
    /// Files and folders starting with the disabled prefix are skipped; files
    /// that fail to parse are logged and skipped.
    pub fn collect_sources(&self, folder: &Path) -> Result<Vec<ScriptSource>> {
        let mut files = Vec::new();
        self.collect_files(folder, &mut files)?;
        files.sort();

        let mut sources = Vec::new();
        for file in files {
            match ScriptSource::from_file(&file) {
                Ok(source) => sources.push(source),
                Err(e) => tracing::error!("Skipping {}: {}", file.display(), e),
            }
        }
        Ok(sources)
    }

    fn collect_files(&self, folder: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
        if !folder.is_dir() {
            return Err(SkriptError::NotFound(format!("Scripts folder {}", folder.display())));
        }
        let config = &self.host.config;
        for entry in fs::read_dir(folder)? {
            let path = entry?.path();
            if path.is_dir() {
                let disabled = path
                    .file_name()
                    .map(|n| !config.disabled_prefix.is_empty() && n.to_string_lossy().starts_with(&config.disabled_prefix))
                    .unwrap_or(false);
                if !disabled {
                    self.collect_files(&path, files)?;
                }
            } else if config.is_script_file(&path) {
                files.push(path);
            }
        }
        Ok(())
    }

    /// Load every enabled script of a folder
    pub fn load_folder(&self, ctx: &mut ParserContext, folder: &Path) -> Result<Vec<LoadedScript>> {
        let sources = self.collect_sources(folder)?;
        tracing::info!("Loading {} script(s) from {}", sources.len(), folder.display());
        Ok(self.load_scripts(ctx, &sources))
    }
}
