//! WGSL sources for the kernel library.
//!
//! Templates carry `{{FORMAT}}`, `{{WG_X}}` and `{{WG_Y}}` placeholders that are
//! filled in when a kernel is built, so the work-group size follows the
//! device's limits and the storage format follows the texture format.

use crate::texture::PixelFormat;

/// Kernel source ready to compile, plus whether it binds a weight buffer.
pub(super) struct KernelSource {
    pub name: &'static str,
    pub wgsl: String,
    pub convolution: bool,
}

/// Looks up `name` in the library and instantiates its template.
pub(super) fn kernel_source(
    name: &str,
    format: PixelFormat,
    workgroup: (u32, u32),
) -> Option<KernelSource> {
    let (name, template, body, convolution) = match name {
        "brightness" => ("brightness", POINTWISE_TEMPLATE, BRIGHTNESS_BODY, false),
        "contrast" => ("contrast", POINTWISE_TEMPLATE, CONTRAST_BODY, false),
        "saturation" => ("saturation", POINTWISE_TEMPLATE, SATURATION_BODY, false),
        "gaussianBlurHorizontal" => ("gaussianBlurHorizontal", BLUR_TEMPLATE, "1, 0", true),
        "gaussianBlurVertical" => ("gaussianBlurVertical", BLUR_TEMPLATE, "0, 1", true),
        _ => return None,
    };
    let wgsl = template
        .replace("{{FORMAT}}", format.wgsl_name())
        .replace("{{WG_X}}", &workgroup.0.to_string())
        .replace("{{WG_Y}}", &workgroup.1.to_string())
        .replace("{{BODY}}", body);
    Some(KernelSource {
        name,
        wgsl,
        convolution,
    })
}

const BRIGHTNESS_BODY: &str = "return rgb + vec3<f32>(value);";
const CONTRAST_BODY: &str = "return (rgb - vec3<f32>(0.5)) * (1.0 + value) + vec3<f32>(0.5);";
const SATURATION_BODY: &str = "return mix(vec3<f32>(luma(rgb)), rgb, 1.0 + value);";

const POINTWISE_TEMPLATE: &str = r#"
struct KernelParams {
    value: f32,
    radius: u32,
    _pad0: u32,
    _pad1: u32,
};

@group(0) @binding(0)
var src_tex: texture_2d<f32>;
@group(0) @binding(1)
var dst_tex: texture_storage_2d<{{FORMAT}}, write>;
@group(0) @binding(2)
var<uniform> params: KernelParams;

// Rec.709 weights
fn luma(rgb: vec3<f32>) -> f32 {
    return 0.2126 * rgb.r + 0.7152 * rgb.g + 0.0722 * rgb.b;
}

fn transform(rgb: vec3<f32>, value: f32) -> vec3<f32> {
    {{BODY}}
}

@compute @workgroup_size({{WG_X}}, {{WG_Y}}, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let dims = textureDimensions(dst_tex);
    if (gid.x >= dims.x || gid.y >= dims.y) {
        return;
    }

    let coord = vec2<i32>(i32(gid.x), i32(gid.y));
    let px = textureLoad(src_tex, coord, 0);
    let rgb = clamp(transform(px.rgb, params.value), vec3<f32>(0.0), vec3<f32>(1.0));
    textureStore(dst_tex, coord, vec4<f32>(rgb, px.a));
}
"#;

// One 1D pass of the separable Gaussian. `{{BODY}}` is the tap step, so both
// directions share the same edge clamping.
const BLUR_TEMPLATE: &str = r#"
struct KernelParams {
    value: f32,
    radius: u32,
    _pad0: u32,
    _pad1: u32,
};

@group(0) @binding(0)
var src_tex: texture_2d<f32>;
@group(0) @binding(1)
var dst_tex: texture_storage_2d<{{FORMAT}}, write>;
@group(0) @binding(2)
var<uniform> params: KernelParams;
@group(0) @binding(3)
var<storage, read> weights: array<f32>;

@compute @workgroup_size({{WG_X}}, {{WG_Y}}, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let dims = textureDimensions(dst_tex);
    if (gid.x >= dims.x || gid.y >= dims.y) {
        return;
    }

    let coord = vec2<i32>(i32(gid.x), i32(gid.y));
    let max_coord = vec2<i32>(i32(dims.x) - 1, i32(dims.y) - 1);
    let step = vec2<i32>({{BODY}});
    let radius = i32(params.radius);

    var acc = vec4<f32>(0.0);
    for (var k = -radius; k <= radius; k = k + 1) {
        let tap = clamp(coord + step * k, vec2<i32>(0, 0), max_coord);
        acc = acc + textureLoad(src_tex, tap, 0) * weights[u32(abs(k))];
    }
    textureStore(dst_tex, coord, clamp(acc, vec4<f32>(0.0), vec4<f32>(1.0)));
}
"#;

/// Draws the filtered texture as a scaled quad. Six vertices, no vertex buffer.
pub(super) const PRESENT_SHADER_SRC: &str = r#"
struct PresentParams {
    scale: vec2<f32>,
    _pad: vec2<f32>,
};

@group(0) @binding(0)
var src_tex: texture_2d<f32>;
@group(0) @binding(1)
var src_sampler: sampler;
@group(0) @binding(2)
var<uniform> params: PresentParams;

struct VertexOut {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> VertexOut {
    var corners = array<vec2<f32>, 6>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(-1.0, 1.0),
        vec2<f32>(-1.0, 1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(1.0, 1.0),
    );
    let corner = corners[index];

    var out: VertexOut;
    out.position = vec4<f32>(corner * params.scale, 0.0, 1.0);
    out.uv = vec2<f32>((corner.x + 1.0) * 0.5, (1.0 - corner.y) * 0.5);
    return out;
}

@fragment
fn fs_main(frag: VertexOut) -> @location(0) vec4<f32> {
    return textureSample(src_tex, src_sampler, frag.uv);
}
"#;
