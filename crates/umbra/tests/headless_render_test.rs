//! Headless rendering integration tests.
//!
//! These need a GPU adapter with compute shaders (real or software). When
//! none is available the tests print a note and return early.

use umbra::{HeadlessRenderer, Options, PassKind, Vec3, Vec4};
use umbra_core::document::{MaterialDesc, NodeDesc, PbrMetallicRoughness, PrimitiveDesc};
use umbra_core::glb::GlbBuilder;

const WIDTH: u32 = 128;
const HEIGHT: u32 = 96;

/// Adds an upward-facing square of half-size `h` at height `y`.
fn push_square(builder: &mut GlbBuilder, name: &str, h: f32, y: f32, material: usize) {
    push_square_node(builder, name, h, y, material, false, None);
}

/// Adds an upward-facing square, optionally with authored `NORMAL`s and a
/// node translation.
fn push_square_node(
    builder: &mut GlbBuilder,
    name: &str,
    h: f32,
    y: f32,
    material: usize,
    with_normals: bool,
    translation: Option<[f32; 3]>,
) {
    let positions = builder.push_positions(&[[-h, y, -h], [-h, y, h], [h, y, h], [h, y, -h]]);
    let indices = builder.push_indices_u16(&[0, 1, 2, 0, 2, 3]);
    let mut prim = PrimitiveDesc {
        indices: Some(indices),
        material: Some(material),
        ..PrimitiveDesc::default()
    };
    prim.attributes.insert("POSITION".into(), positions);
    if with_normals {
        let normals = builder.push_normals(&[[0.0, 1.0, 0.0]; 4]);
        prim.attributes.insert("NORMAL".into(), normals);
    }
    let mesh = builder.push_mesh(name, vec![prim]);
    builder.push_node(NodeDesc {
        name: Some(name.into()),
        mesh: Some(mesh),
        translation,
        ..NodeDesc::default()
    });
}

/// A ground square, optionally with a smaller square floating above it.
fn scene(with_occluder: bool) -> Vec<u8> {
    let mut builder = GlbBuilder::new();
    let matte = builder.push_material(MaterialDesc {
        name: Some("matte".into()),
        pbr_metallic_roughness: Some(PbrMetallicRoughness {
            base_color_factor: Some([1.0, 1.0, 1.0, 1.0]),
            metallic_factor: Some(0.0),
            roughness_factor: Some(1.0),
        }),
        emissive_factor: None,
    });
    push_square(&mut builder, "ground", 4.0, 0.0, matte);
    if with_occluder {
        push_square(&mut builder, "occluder", 1.0, 2.0, matte);
    }
    builder.build()
}

/// Ground and occluder with authored normals; the occluder sits at the origin
/// of its mesh and is lifted by its node.
fn translated_normal_scene() -> Vec<u8> {
    let mut builder = GlbBuilder::new();
    let matte = builder.push_material(MaterialDesc {
        name: Some("matte".into()),
        pbr_metallic_roughness: Some(PbrMetallicRoughness {
            base_color_factor: Some([1.0, 1.0, 1.0, 1.0]),
            metallic_factor: Some(0.0),
            roughness_factor: Some(1.0),
        }),
        emissive_factor: None,
    });
    push_square_node(&mut builder, "ground", 4.0, 0.0, matte, true, None);
    push_square_node(
        &mut builder,
        "occluder",
        1.0,
        0.0,
        matte,
        true,
        Some([0.0, 2.0, 0.0]),
    );
    builder.build()
}

fn options() -> Options {
    let mut options = Options::default();
    options.background_color = Vec4::new(0.0, 0.0, 1.0, 1.0);
    options.light.position = Vec3::new(0.0, 10.0, 0.0);
    options.light.ambient = 0.2;
    options.camera.eye = Vec3::new(0.0, 8.0, 8.0);
    options.camera.center = Vec3::ZERO;
    options.volume.diagnostics = true;
    options
}

/// Grey pixels at ambient brightness: ground the light does not reach.
fn shadowed_pixels(pixels: &[u8]) -> usize {
    pixels
        .chunks_exact(4)
        .filter(|px| {
            let (r, g, b) = (i32::from(px[0]), i32::from(px[1]), i32::from(px[2]));
            (60..=180).contains(&r) && (r - g).abs() < 12 && (r - b).abs() < 12
        })
        .count()
}

fn renderer(bytes: &[u8]) -> Option<HeadlessRenderer> {
    match HeadlessRenderer::new(bytes, &options(), WIDTH, HEIGHT) {
        Ok(r) => Some(r),
        Err(e) => {
            // Also covers device creation failing on hosts without a usable GPU.
            eprintln!("Skipping headless test: {e}");
            None
        }
    }
}

#[test]
fn headless_shadow_tests() {
    let _ = env_logger::builder().is_test(true).try_init();

    // --- Unshadowed ground ---
    let Some(mut plain) = renderer(&scene(false)) else {
        return;
    };
    let (pixels, report) = plain.render().expect("render failed");
    assert_eq!(pixels.len(), (WIDTH * HEIGHT * 4) as usize);
    assert_eq!(report.passes, PassKind::ORDER.to_vec());
    assert_eq!(report.volumes.len(), 1);
    assert!(report.volumes.iter().all(|v| !v.overflowed()));
    // Two light-facing triangles, one 24-index claim each.
    assert_eq!(report.volumes[0].counter.claimed, 48);
    assert_eq!(
        shadowed_pixels(&pixels),
        0,
        "ground should be fully lit without an occluder"
    );
    assert!(
        pixels.chunks_exact(4).any(|px| px[0] > 200 && px[2] > 200),
        "lit ground should be visible"
    );

    // --- Occluder casts a shadow ---
    let Some(mut shadowed) = renderer(&scene(true)) else {
        return;
    };
    assert_eq!(shadowed.model().volume_count(), 2);
    let (pixels, report) = shadowed.render().expect("render failed");
    assert_eq!(report.frame_index, 0);
    assert!(report.volumes.iter().all(|v| !v.overflowed()));
    assert!(
        shadowed_pixels(&pixels) > 50,
        "occluder should shadow part of the ground"
    );

    // --- Moving the occluder away removes the shadow ---
    {
        let (model, queue) = shadowed.model_mut();
        let moved = umbra::Mat4::from_translation(Vec3::new(0.0, 0.0, 100.0));
        assert!(model.set_node_transform(queue, 1, moved));
        assert!(!model.set_node_transform(queue, 99, moved));
    }
    let (pixels, report) = shadowed.render().expect("render failed");
    assert_eq!(report.frame_index, 1);
    assert_eq!(shadowed_pixels(&pixels), 0);

    // --- Frames are repeatable ---
    let (again, _) = shadowed.render().expect("render failed");
    assert_eq!(pixels, again);
}

#[test]
fn headless_translated_node_with_normals_casts_shadow() {
    let _ = env_logger::builder().is_test(true).try_init();

    let Some(mut renderer) = renderer(&translated_normal_scene()) else {
        return;
    };
    let (pixels, report) = renderer.render().expect("render failed");
    assert_eq!(report.volumes.len(), 2);
    // Both squares face the light: two 24-index claims each.
    assert!(report.volumes.iter().all(|v| v.counter.claimed == 48));
    assert!(report.volumes.iter().all(|v| !v.overflowed()));
    assert!(
        shadowed_pixels(&pixels) > 50,
        "translated occluder with normals should shadow the ground"
    );
    assert!(
        pixels.chunks_exact(4).any(|px| px[0] > 200 && px[1] > 200 && px[2] > 200),
        "lit ground with normals should be visible"
    );
}

#[test]
fn headless_rejects_corrupt_model() {
    let mut bytes = scene(false);
    bytes[0] = 0;
    let Err(err) = HeadlessRenderer::new(&bytes, &options(), WIDTH, HEIGHT) else {
        panic!("corrupt model must not load");
    };
    if err.is_format() {
        return;
    }
    // The engine is created before decoding, so a missing GPU surfaces first.
    eprintln!("Skipping headless test: no usable GPU ({err})");
}
