//! Shader programs used by the pipeline
//!
//! Each program is a WGSL module with a fixed parameter struct and bind group
//! layout. Sources are validated with naga before any backend sees them, so a
//! broken program fails pipeline creation with [`BackendError::ShaderCreationFailed`]
//! on every backend.

use crate::backend::{BackendError, BackendResult};
use crate::pipeline::{combine_pass, debug_view, encoding, gbuffer_pass, lighting_pass, quad};

/// Closed set of programs the pipeline knows how to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderProgram {
    /// Surface encoding into the three G-buffer targets
    GBuffer,
    /// Phong evaluation of one directional light from the G-buffer
    DirectionalLight,
    /// albedo x (diffuse + ambient) + specular into the display surface
    Combine,
    /// Copy of one intermediate buffer into a viewport, for inspection
    DebugBlit,
}

/// Vertex stream a program consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexKind {
    /// [`crate::backend::Vertex`]
    Mesh,
    /// [`crate::backend::QuadVertex`]
    Quad,
}

impl ShaderProgram {
    pub const ALL: [ShaderProgram; 4] = [
        ShaderProgram::GBuffer,
        ShaderProgram::DirectionalLight,
        ShaderProgram::Combine,
        ShaderProgram::DebugBlit,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ShaderProgram::GBuffer => "gbuffer",
            ShaderProgram::DirectionalLight => "directional_light",
            ShaderProgram::Combine => "combine",
            ShaderProgram::DebugBlit => "debug_blit",
        }
    }

    /// Look a program up by its label
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|program| program.label() == label)
    }

    /// WGSL source; entry points are always `vs_main` and `fs_main`
    ///
    /// Programs share the encoding helpers and the full-screen vertex stage,
    /// which are prepended to the program's own code.
    pub fn source(&self) -> String {
        let parts: &[&str] = match self {
            ShaderProgram::GBuffer => &[encoding::WGSL_ENCODING, gbuffer_pass::GBUFFER_SHADER],
            ShaderProgram::DirectionalLight => &[
                encoding::WGSL_ENCODING,
                quad::FULLSCREEN_VERTEX_SHADER,
                lighting_pass::DIRECTIONAL_LIGHT_SHADER,
            ],
            ShaderProgram::Combine => &[
                encoding::WGSL_ENCODING,
                quad::FULLSCREEN_VERTEX_SHADER,
                combine_pass::COMBINE_SHADER,
            ],
            ShaderProgram::DebugBlit => &[quad::FULLSCREEN_VERTEX_SHADER, debug_view::DEBUG_BLIT_SHADER],
        };
        parts.concat()
    }

    pub fn vertex_kind(&self) -> VertexKind {
        match self {
            ShaderProgram::GBuffer => VertexKind::Mesh,
            _ => VertexKind::Quad,
        }
    }

    /// Number of color outputs written by the fragment stage
    pub fn color_outputs(&self) -> usize {
        match self {
            ShaderProgram::GBuffer => 3,
            ShaderProgram::DirectionalLight => 2,
            ShaderProgram::Combine | ShaderProgram::DebugBlit => 1,
        }
    }
}

impl std::fmt::Display for ShaderProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Parse and validate a program's WGSL source
pub fn compile(program: ShaderProgram) -> BackendResult<naga::Module> {
    let source = program.source();
    let module = naga::front::wgsl::parse_str(&source).map_err(|e| {
        BackendError::ShaderCreationFailed(format!(
            "{}: {}",
            program,
            e.emit_to_string(&source)
        ))
    })?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::default(),
    );
    validator
        .validate(&module)
        .map_err(|e| BackendError::ShaderCreationFailed(format!("{}: {}", program, e)))?;

    for entry_point in ["vs_main", "fs_main"] {
        if !module.entry_points.iter().any(|ep| ep.name == entry_point) {
            return Err(BackendError::ShaderCreationFailed(format!(
                "{}: missing entry point {}",
                program, entry_point
            )));
        }
    }

    Ok(module)
}

/// `(group, binding)` pairs of every resource the program declares, sorted
pub fn resource_bindings(program: ShaderProgram) -> BackendResult<Vec<(u32, u32)>> {
    let module = compile(program)?;
    let mut bindings: Vec<(u32, u32)> = module
        .global_variables
        .iter()
        .filter_map(|(_, var)| var.binding.as_ref().map(|b| (b.group, b.binding)))
        .collect();
    bindings.sort_unstable();
    Ok(bindings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_program_compiles() {
        for program in ShaderProgram::ALL {
            let module = compile(program);
            assert!(module.is_ok(), "{} failed: {:?}", program, module.err());
        }
    }

    #[test]
    fn test_labels_round_trip() {
        for program in ShaderProgram::ALL {
            assert_eq!(ShaderProgram::from_label(program.label()), Some(program));
        }
        assert_eq!(ShaderProgram::from_label("forward"), None);
    }

    #[test]
    fn test_fragment_outputs_match_targets() {
        for program in ShaderProgram::ALL {
            let module = compile(program).unwrap();
            let fs = module
                .entry_points
                .iter()
                .find(|ep| ep.name == "fs_main")
                .unwrap();
            let outputs = match fs.function.result.as_ref().map(|r| &module.types[r.ty].inner) {
                Some(naga::TypeInner::Struct { members, .. }) => members.len(),
                Some(_) => 1,
                None => 0,
            };
            assert_eq!(outputs, program.color_outputs(), "{}", program);
        }
    }
}
