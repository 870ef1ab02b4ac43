use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use super::Geometry;
use crate::error::{Error, Result};
use crate::pointcloud::PointCloud;
use ndarray::{Array2, Axis};
use ply_rs::ply::{
    Addable, DefaultElement, ElementDef, Encoding, Ply, Property, PropertyDef, PropertyType,
    ScalarType,
};
use ply_rs::writer::Writer;
use ply_rs::{parser, ply};

struct Vertex {
    point: [f32; 3],
    normal: [f32; 3],
    color: [u8; 3],
}

// The parser needs PropertyAccess to know where to store each vertex attribute.
impl ply::PropertyAccess for Vertex {
    fn new() -> Self {
        Vertex {
            point: [0f32; 3],
            normal: [0f32; 3],
            color: [0u8; 3],
        }
    }
    fn set_property(&mut self, key: String, property: ply::Property) {
        let value = match property {
            ply::Property::Float(v) => v,
            ply::Property::Double(v) => v as f32,
            ply::Property::UChar(v) => {
                match key.as_ref() {
                    "red" => self.color[0] = v,
                    "green" => self.color[1] = v,
                    "blue" => self.color[2] = v,
                    _ => (),
                }
                return;
            }
            _ => return,
        };

        match key.as_ref() {
            "x" => self.point[0] = value,
            "y" => self.point[1] = value,
            "z" => self.point[2] = value,
            "nx" => self.normal[0] = value,
            "ny" => self.normal[1] = value,
            "nz" => self.normal[2] = value,
            _ => (),
        }
    }
}

/// Reads the vertices of a PLY file. Faces and other elements are ignored.
pub fn read_ply<P>(filepath: P) -> Result<PointCloud>
where
    P: AsRef<Path>,
{
    let mut f = BufReader::new(File::open(filepath)?);

    let vertex_parser = parser::Parser::<Vertex>::new();
    let header = vertex_parser.read_header(&mut f)?;

    let element = header
        .elements
        .get("vertex")
        .ok_or_else(|| Error::Parser("PLY file has no vertex element".to_string()))?;
    let vertex_vec = vertex_parser.read_payload_for_element(&mut f, element, &header)?;

    let points = Array2::<f32>::from_shape_fn((vertex_vec.len(), 3), |(i, c)| {
        vertex_vec[i].point[c]
    });

    let has_all = |keys: [&str; 3]| keys.iter().all(|k| element.properties.contains_key(*k));
    let normals = has_all(["nx", "ny", "nz"]).then(|| {
        Array2::<f32>::from_shape_fn((vertex_vec.len(), 3), |(i, c)| vertex_vec[i].normal[c])
    });
    let colors = has_all(["red", "green", "blue"]).then(|| {
        Array2::<u8>::from_shape_fn((vertex_vec.len(), 3), |(i, c)| vertex_vec[i].color[c])
    });

    PointCloud::from_geometry(Geometry {
        points,
        colors,
        normals,
    })
}

fn add_scalar_properties(element: &mut ElementDef, keys: &[&str], scalar_type: ScalarType) {
    for key in keys {
        element.properties.add(PropertyDef::new(
            key.to_string(),
            PropertyType::Scalar(scalar_type.clone()),
        ));
    }
}

/// Writes a point cloud as an ASCII PLY file with positions, normals and colors (when present).
pub fn write_ply<P>(filepath: P, pcl: &PointCloud) -> Result<()>
where
    P: AsRef<Path>,
{
    let mut ply = Ply::<DefaultElement>::new();
    let mut vertex_element = ElementDef::new("vertex".to_string());
    add_scalar_properties(&mut vertex_element, &["x", "y", "z"], ScalarType::Float);

    let mut vertex_array: Vec<DefaultElement> = pcl
        .points
        .axis_iter(Axis(0))
        .map(|point| {
            let mut elem = DefaultElement::new();
            elem.insert("x".to_string(), Property::Float(point[0]));
            elem.insert("y".to_string(), Property::Float(point[1]));
            elem.insert("z".to_string(), Property::Float(point[2]));
            elem
        })
        .collect();

    if let Some(normals) = &pcl.normals {
        add_scalar_properties(&mut vertex_element, &["nx", "ny", "nz"], ScalarType::Float);
        for (elem, normal) in vertex_array.iter_mut().zip(normals.axis_iter(Axis(0))) {
            elem.insert("nx".to_string(), Property::Float(normal[0]));
            elem.insert("ny".to_string(), Property::Float(normal[1]));
            elem.insert("nz".to_string(), Property::Float(normal[2]));
        }
    }

    if let Some(colors) = &pcl.colors {
        add_scalar_properties(
            &mut vertex_element,
            &["red", "green", "blue"],
            ScalarType::UChar,
        );
        for (elem, color) in vertex_array.iter_mut().zip(colors.axis_iter(Axis(0))) {
            elem.insert("red".to_string(), Property::UChar(color[0]));
            elem.insert("green".to_string(), Property::UChar(color[1]));
            elem.insert("blue".to_string(), Property::UChar(color[2]));
        }
    }

    ply.header.elements.add(vertex_element);
    ply.payload.insert("vertex".to_string(), vertex_array);
    ply.make_consistent()
        .map_err(|err| Error::Serialization(format!("Inconsistent PLY data: {err:?}")))?;
    ply.header.encoding = Encoding::Ascii;

    let mut buf = BufWriter::new(File::create(filepath)?);
    Writer::new().write_ply(&mut buf, &mut ply)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::{read_ply, write_ply};
    use crate::pointcloud::PointCloud;

    #[test]
    fn should_read_what_was_written() {
        let pcl = PointCloud::new(
            array![[0.1, 0.2, 0.3], [-1.5, 2.25, 1.0]],
            Some(array![[0.0, 0.0, 1.0], [0.0, 0.0, 0.0]]),
            Some(array![[1, 2, 3], [250, 128, 0]]),
        )
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloud.ply");
        write_ply(&path, &pcl).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("ply"));
        assert!(content.contains("format ascii"));

        let read = read_ply(&path).unwrap();
        assert_eq!(read, pcl);
    }

    #[test]
    fn should_omit_missing_attributes() {
        let pcl = PointCloud::new(array![[1.0, 2.0, 3.0]], None, None).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.ply");
        write_ply(&path, &pcl).unwrap();

        let read = read_ply(&path).unwrap();
        assert!(read.normals.is_none());
        assert!(read.colors.is_none());
        assert_eq!(read.points, pcl.points);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(matches!(
            read_ply("does/not/exist.ply"),
            Err(crate::error::Error::Io(_))
        ));
    }
}
