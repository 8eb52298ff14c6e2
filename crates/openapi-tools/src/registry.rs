//! Compute-once access to the compiled tool set.
//!
//! The first caller of [`ToolRegistry::tools`] runs the load-and-compile pass; concurrent callers
//! wait for it and share the result. A failed pass is not remembered, so the next call retries.

use crate::config::AgentConfig;
use crate::error::{OpenApiToolsError, Result};
use crate::executor::RequestExecutor;
use crate::loader::SpecLoader;
use crate::tool::{ToolCompiler, ToolSet};
use std::sync::Arc;
#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};
use swagger_agent_http_tools::runtime::HttpTransport;
use tokio::sync::OnceCell;

pub struct ToolRegistry {
    config: AgentConfig,
    executor: Arc<RequestExecutor>,
    tools: OnceCell<Arc<ToolSet>>,
    #[cfg(test)]
    passes: AtomicUsize,
}

impl ToolRegistry {
    /// Build a registry without compiling anything yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP transport cannot be built.
    pub fn new(config: AgentConfig) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::new(&config.transport)?;
        let executor = Arc::new(RequestExecutor::new(transport, config.security.clone()));
        Ok(Self {
            config,
            executor,
            tools: OnceCell::new(),
            #[cfg(test)]
            passes: AtomicUsize::new(0),
        })
    }

    /// Build a registry and, unless `lazyLoading` is set, compile the tools right away.
    ///
    /// # Errors
    ///
    /// Returns an error if [`Self::new`] fails or, in eager mode, if compilation fails.
    pub async fn start(config: AgentConfig) -> Result<Self> {
        let registry = Self::new(config)?;
        if registry.config.lazy_loading {
            tracing::info!("Lazy loading enabled; tools compile on first use");
        } else {
            registry.tools().await?;
        }
        Ok(registry)
    }

    /// The compiled tool set, compiling it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`OpenApiToolsError::Startup`] if the spec directory is unusable or no tool could
    /// be compiled from it.
    pub async fn tools(&self) -> Result<Arc<ToolSet>> {
        self.tools
            .get_or_try_init(|| async {
                #[cfg(test)]
                self.passes.fetch_add(1, Ordering::SeqCst);
                let config = self.config.clone();
                let executor = Arc::clone(&self.executor);
                let set = tokio::task::spawn_blocking(move || compile_tool_set(&config, executor))
                    .await
                    .map_err(|e| {
                        OpenApiToolsError::Startup(format!("tool compilation task failed: {e}"))
                    })??;
                Ok::<_, OpenApiToolsError>(Arc::new(set))
            })
            .await
            .cloned()
    }

    /// The tool set if it has been compiled already.
    #[must_use]
    pub fn loaded(&self) -> Option<Arc<ToolSet>> {
        self.tools.get().cloned()
    }

    /// How many compilation passes have been started, including failed ones.
    #[cfg(test)]
    fn compile_passes(&self) -> usize {
        self.passes.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }
}

fn compile_tool_set(config: &AgentConfig, executor: Arc<RequestExecutor>) -> Result<ToolSet> {
    let loaded = SpecLoader::new(config.default_fallback_url.clone())
        .load_directory(&config.specs_directory)?;
    let set = ToolCompiler::new(config.max_tool_name_length, executor)?
        .compile(loaded.cache, loaded.diagnostics);

    if set.is_empty() {
        return Err(OpenApiToolsError::Startup(format!(
            "no tools could be compiled from '{}'",
            config.specs_directory.display()
        )));
    }
    Ok(set)
}
