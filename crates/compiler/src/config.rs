//! Knobs for the `compile` pipeline's final step: handing the generated
//! assembly and the embedded runtime archive to the system assembler
//! and linker.
//!
//! This is deliberately small. The older compiler this crate grew out
//! of carried an `ExternalBuiltin` registry here for injecting
//! caller-supplied symbols into the generated program; nothing in this
//! language needs that, since `+`/`print_int`/etc. are fixed and the
//! only external artifact ever linked in is `vela-runtime` itself.

use std::path::PathBuf;

/// `VELAC_CC` overrides the default assembler/linker program (`cc`).
pub const CC_ENV_VAR: &str = "VELAC_CC";

/// Configuration for [`crate::compile_to_executable`].
#[derive(Debug, Clone)]
pub struct VelaConfig {
    /// The program invoked to assemble and link, e.g. `cc` or `clang`.
    /// Defaults to `$VELAC_CC`, falling back to `cc`.
    pub cc: String,
    /// Extra arguments appended after the generated `.s` file and the
    /// extracted runtime archive, e.g. `-static` or `-L/opt/lib`.
    pub extra_link_args: Vec<String>,
    /// Where the linked executable is written.
    pub output: PathBuf,
}

impl Default for VelaConfig {
    fn default() -> Self {
        VelaConfig {
            cc: std::env::var(CC_ENV_VAR).unwrap_or_else(|_| "cc".to_string()),
            extra_link_args: Vec::new(),
            output: PathBuf::from("out"),
        }
    }
}

impl VelaConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cc(mut self, cc: impl Into<String>) -> Self {
        self.cc = cc.into();
        self
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = output.into();
        self
    }

    pub fn with_extra_link_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_link_args.push(arg.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cc_is_cc_when_the_env_var_is_unset() {
        // SAFETY: tests run single-threaded here and nothing else in this
        // process reads VELAC_CC concurrently.
        unsafe {
            std::env::remove_var(CC_ENV_VAR);
        }
        assert_eq!(VelaConfig::default().cc, "cc");
    }

    #[test]
    fn builder_methods_override_the_defaults() {
        let config = VelaConfig::new().with_cc("clang").with_output("a.out").with_extra_link_arg("-static");
        assert_eq!(config.cc, "clang");
        assert_eq!(config.output, PathBuf::from("a.out"));
        assert_eq!(config.extra_link_args, vec!["-static".to_string()]);
    }
}
