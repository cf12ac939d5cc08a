//! WGSL for the two programs shared by every replay pass.
//!
//! Binding layout (group 0):
//! - `@binding(0)` staged source image (`texture_2d<f32>`)
//! - `@binding(1)` nearest sampler
//! - `@binding(2)` uniform `vec4<f32>`, `xy` = texture-coordinate extent of the valid region
//!
//! The fragment stage reads a single `u32` push constant at offset 0: the bit being replayed.

pub const VS_ENTRY: &str = "vs_main";
pub const FS_ENTRY: &str = "fs_main";

/// Size in bytes of the fragment push-constant block.
pub const PUSH_CONSTANT_BYTES: u32 = 4;

/// Full-screen triangle from `vertex_index` alone; no vertex buffers.
pub const STENCIL_VS_WGSL: &str = r#"
struct VsOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) id: u32) -> VsOut {
    var out: VsOut;
    // (0,0), (0,2), (2,0): one triangle covering the whole viewport.
    let uv = vec2<f32>(select(0.0, 2.0, id == 2u), select(0.0, 2.0, id == 1u));
    out.uv = uv;
    out.pos = vec4<f32>(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0, 0.0, 1.0);
    return out;
}
"#;

/// Discards fragments whose sampled alpha lacks the pushed bit; survivors let the pipeline's
/// stencil-replace write the reference value.
pub const STENCIL_FS_WGSL: &str = r#"
struct PassConstants {
    stencil_value: u32,
};

var<push_constant> pass_constants: PassConstants;

@group(0) @binding(0) var src_tex: texture_2d<f32>;
@group(0) @binding(1) var src_sampler: sampler;
@group(0) @binding(2) var<uniform> src_extent: vec4<f32>;

@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    let texel = textureSampleLevel(src_tex, src_sampler, uv * src_extent.xy, 0.0);
    let bits = u32(floor(texel.a * 255.99)) & 0xffu;
    if ((bits & pass_constants.stencil_value) == 0u) {
        discard;
    }
    return vec4<f32>(texel.a);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(source: &str, entry: &str, stage: naga::ShaderStage) {
        let module = naga::front::wgsl::parse_str(source)
            .unwrap_or_else(|err| panic!("{entry} WGSL parse failed: {err}"));
        naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::PUSH_CONSTANT,
        )
        .validate(&module)
        .unwrap_or_else(|err| panic!("{entry} WGSL validation failed: {err:?}"));

        let ep = module
            .entry_points
            .iter()
            .find(|ep| ep.name == entry)
            .unwrap_or_else(|| panic!("missing entry point {entry}"));
        assert_eq!(ep.stage, stage);
    }

    #[test]
    fn programs_are_valid_wgsl() {
        validate(STENCIL_VS_WGSL, VS_ENTRY, naga::ShaderStage::Vertex);
        validate(STENCIL_FS_WGSL, FS_ENTRY, naga::ShaderStage::Fragment);
    }

    #[test]
    fn vertex_program_takes_no_vertex_inputs() {
        let module = naga::front::wgsl::parse_str(STENCIL_VS_WGSL).unwrap();
        let ep = &module.entry_points[0];
        assert_eq!(ep.function.arguments.len(), 1);
        assert!(matches!(
            ep.function.arguments[0].binding,
            Some(naga::Binding::BuiltIn(naga::BuiltIn::VertexIndex))
        ));
    }
}
