//! Model loading through the public facade. None of these need a GPU.

use proptest::prelude::*;
use umbra::{decode_model, Options};
use umbra_core::document::{NodeDesc, PrimitiveDesc};
use umbra_core::glb::GlbBuilder;
use umbra_core::{MaterialParams, MaterialSlot};

#[test]
fn single_triangle_binds_default_material() {
    let bytes = GlbBuilder::single_triangle().build();
    assert_eq!(&bytes[0..4], &0x4654_6C67u32.to_le_bytes());

    let asset = decode_model(&bytes).unwrap();
    assert_eq!(asset.nodes.len(), 1);
    assert_eq!(asset.meshes.len(), 1);
    assert_eq!(asset.meshes[0].primitives.len(), 1);

    let prim = &asset.meshes[0].primitives[0];
    assert_eq!(prim.material, MaterialSlot::Default);
    assert_eq!(asset.material(prim.material), MaterialParams::default());
    assert_eq!(prim.triangle_count(), 1);
    assert!(asset.views.iter().all(|v| v.is_sealed()));
}

#[test]
fn corrupted_magic_is_format_error() {
    let mut bytes = GlbBuilder::single_triangle().build();
    bytes[0] ^= 0xFF;
    let err = decode_model(&bytes).unwrap_err();
    assert!(err.is_format(), "{err}");
    assert!(!err.is_unsupported_gpu());
}

#[test]
fn unknown_component_type_is_unsupported() {
    let mut builder = GlbBuilder::single_triangle();
    // DOUBLE is not a glTF 2.0 component type
    builder.document.accessors[1].component_type = 5130;
    let err = decode_model(&builder.build()).unwrap_err();
    assert!(err.is_unsupported_type(), "{err}");
}

#[test]
fn node_hierarchy_is_flattened() {
    let mut builder = GlbBuilder::single_triangle();
    builder.document.nodes[0].translation = Some([0.0, 2.0, 0.0]);
    let child = builder.push_node(NodeDesc {
        name: Some("child".into()),
        mesh: Some(0),
        translation: Some([1.0, 0.0, 0.0]),
        ..NodeDesc::default()
    });
    builder.document.nodes[0].children.push(child);

    let asset = decode_model(&builder.build()).unwrap();
    assert_eq!(asset.nodes.len(), 2);
    let world = asset.node_transform(child as u32).unwrap();
    let origin = world.transform_point3(umbra::Vec3::ZERO);
    assert!((origin - umbra::Vec3::new(1.0, 2.0, 0.0)).length() < 1e-6);
}

#[test]
fn mesh_without_positions_is_rejected() {
    let mut builder = GlbBuilder::new();
    let indices = builder.push_indices_u16(&[0, 1, 2]);
    let mesh = builder.push_mesh(
        "empty",
        vec![PrimitiveDesc {
            indices: Some(indices),
            ..PrimitiveDesc::default()
        }],
    );
    builder.push_node(NodeDesc {
        mesh: Some(mesh),
        ..NodeDesc::default()
    });
    assert!(decode_model(&builder.build()).is_err());
}

#[test]
fn options_from_json_override_defaults() {
    let options = Options::from_json_str(
        r#"{ "volume": { "multiplier": 6 }, "light": { "position": [0.0, 20.0, 0.0] } }"#,
    )
    .unwrap();
    assert_eq!(options.volume.multiplier, 6);
    assert_eq!(options.light.position, umbra::Vec3::new(0.0, 20.0, 0.0));
    assert_eq!(options.camera, Options::default().camera);
}

#[test]
fn malformed_options_are_not_a_model_format_error() {
    let path = std::env::temp_dir().join(format!("umbra-options-{}.json", std::process::id()));
    std::fs::write(&path, "{ \"volume\": ").unwrap();
    let err = umbra::load_options(Some(&path)).unwrap_err();
    std::fs::remove_file(&path).unwrap();

    assert!(!err.is_format(), "{err}");
    assert!(matches!(err, umbra::Error::Model(ref e) if e.is_config()), "{err}");
}

#[test]
fn missing_file_keeps_path() {
    let err = umbra::read_file("/nonexistent/model.glb").unwrap_err();
    assert!(err.to_string().contains("/nonexistent/model.glb"));
}

proptest! {
    #[test]
    fn truncated_streams_never_panic(cut in 0usize..200) {
        let bytes = GlbBuilder::single_triangle().build();
        let cut = cut.min(bytes.len().saturating_sub(1));
        prop_assert!(decode_model(&bytes[..cut]).is_err());
    }

    #[test]
    fn flipped_bytes_never_panic(index in 0usize..400, mask in 1u8..=255) {
        let mut bytes = GlbBuilder::single_triangle().build();
        let index = index % bytes.len();
        bytes[index] ^= mask;
        let _ = decode_model(&bytes);
    }
}

#[test]
fn translated_node_keeps_authored_normals() {
    let mut builder = GlbBuilder::single_triangle();
    let normals = builder.push_normals(&[[0.0, 0.0, 1.0]; 3]);
    builder.document.meshes[0].primitives[0]
        .attributes
        .insert("NORMAL".into(), normals);
    builder.document.nodes[0].translation = Some([0.0, 10.0, 0.0]);

    let asset = decode_model(&builder.build()).unwrap();
    let prim = &asset.meshes[0].primitives[0];
    assert!(prim.normals.is_some());
    let world = asset.node_transform(0).unwrap();
    // Directions ignore the translation; points do not.
    assert_eq!(world.transform_vector3(umbra::Vec3::Z), umbra::Vec3::Z);
    assert_eq!(
        world.transform_point3(umbra::Vec3::ZERO),
        umbra::Vec3::new(0.0, 10.0, 0.0)
    );
}
