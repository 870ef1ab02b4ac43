use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use itertools::Itertools;
use ndarray::Array2;

use crate::error::{Error, Result};
use crate::pointcloud::PointCloud;

fn pack_rgb(color: [u8; 3]) -> u32 {
    ((color[0] as u32) << 16) | ((color[1] as u32) << 8) | color[2] as u32
}

fn unpack_rgb(rgb: u32) -> [u8; 3] {
    [(rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8]
}

/// Writes a point cloud as an ASCII PCD (v0.7) file.
///
/// Colors are packed into a single unsigned `rgb` field and normals, when
/// present, are stored in `normal_x normal_y normal_z`.
pub fn write_pcd<P>(filepath: P, pcl: &PointCloud) -> Result<()>
where
    P: AsRef<Path>,
{
    let mut fields = vec![("x", 'F'), ("y", 'F'), ("z", 'F')];
    if pcl.colors.is_some() {
        fields.push(("rgb", 'U'));
    }
    if pcl.normals.is_some() {
        fields.extend([("normal_x", 'F'), ("normal_y", 'F'), ("normal_z", 'F')]);
    }

    let names = fields.iter().map(|(name, _)| name).join(" ");
    let types = fields.iter().map(|(_, kind)| kind).join(" ");
    let sizes = std::iter::repeat("4").take(fields.len()).join(" ");
    let counts = std::iter::repeat("1").take(fields.len()).join(" ");

    let mut out = BufWriter::new(File::create(filepath)?);
    writeln!(out, "# .PCD v0.7 - Point Cloud Data file format")?;
    writeln!(out, "VERSION 0.7")?;
    writeln!(out, "FIELDS {names}")?;
    writeln!(out, "SIZE {sizes}")?;
    writeln!(out, "TYPE {types}")?;
    writeln!(out, "COUNT {counts}")?;
    writeln!(out, "WIDTH {}", pcl.len())?;
    writeln!(out, "HEIGHT 1")?;
    writeln!(out, "VIEWPOINT 0 0 0 1 0 0 0")?;
    writeln!(out, "POINTS {}", pcl.len())?;
    writeln!(out, "DATA ascii")?;

    for i in 0..pcl.len() {
        let point = pcl.points.row(i);
        write!(out, "{} {} {}", point[0], point[1], point[2])?;
        if let Some(colors) = &pcl.colors {
            let color = colors.row(i);
            write!(out, " {}", pack_rgb([color[0], color[1], color[2]]))?;
        }
        if let Some(normals) = &pcl.normals {
            let normal = normals.row(i);
            write!(out, " {} {} {}", normal[0], normal[1], normal[2])?;
        }
        writeln!(out)?;
    }
    out.flush()?;

    Ok(())
}

fn parse_value<T: std::str::FromStr>(token: &str, line_number: usize) -> Result<T> {
    token
        .parse::<T>()
        .map_err(|_| Error::Parser(format!("Invalid value `{token}` at line {line_number}")))
}

/// Reads an ASCII PCD file holding `x y z` and optionally `rgb`/`rgba` and
/// `normal_x normal_y normal_z` fields. Other fields are ignored.
pub fn read_pcd<P>(filepath: P) -> Result<PointCloud>
where
    P: AsRef<Path>,
{
    let reader = BufReader::new(File::open(filepath)?);
    let mut lines = reader.lines().enumerate();

    let mut fields = Vec::<String>::new();
    let mut types = Vec::<String>::new();
    let mut num_points = None;

    for (line_number, line) in lines.by_ref() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut tokens = line.split_whitespace();
        let key = tokens.next().unwrap_or_default();
        let values = tokens.map(str::to_string).collect::<Vec<_>>();
        match key {
            "FIELDS" => fields = values,
            "TYPE" => types = values,
            "POINTS" => {
                let value = values.first().map(String::as_str).unwrap_or_default();
                num_points = Some(parse_value::<usize>(value, line_number + 1)?);
            }
            "DATA" => {
                if values.first().map(String::as_str) != Some("ascii") {
                    return Err(Error::Parser(
                        "Only ASCII PCD files are supported".to_string(),
                    ));
                }
                break;
            }
            _ => (),
        }
    }

    let find = |name: &str| fields.iter().position(|field| field == name);
    let num_points =
        num_points.ok_or_else(|| Error::Parser("PCD header has no POINTS entry".to_string()))?;
    let xyz = match (find("x"), find("y"), find("z")) {
        (Some(x), Some(y), Some(z)) => [x, y, z],
        _ => return Err(Error::Parser("PCD file has no x, y, z fields".to_string())),
    };
    let rgb = find("rgb").or_else(|| find("rgba"));
    let rgb_is_float = rgb.and_then(|idx| types.get(idx)).map(|t| t == "F") == Some(true);
    let normal = match (find("normal_x"), find("normal_y"), find("normal_z")) {
        (Some(x), Some(y), Some(z)) => Some([x, y, z]),
        _ => None,
    };

    // Grown from the data lines, the header count is only checked at the end.
    let mut points = Vec::<f32>::new();
    let mut colors = rgb.map(|_| Vec::<u8>::new());
    let mut normals = normal.map(|_| Vec::<f32>::new());

    let mut count = 0;
    for (line_number, line) in lines {
        let line = line?;
        let tokens = line.split_whitespace().collect::<Vec<_>>();
        if tokens.is_empty() {
            continue;
        }
        if count >= num_points {
            return Err(Error::Parser(format!(
                "PCD file has more than {num_points} points"
            )));
        }
        if tokens.len() < fields.len() {
            return Err(Error::Parser(format!(
                "Expected {} values at line {}",
                fields.len(),
                line_number + 1
            )));
        }

        for idx in xyz {
            points.push(parse_value(tokens[idx], line_number + 1)?);
        }
        if let (Some(colors), Some(idx)) = (colors.as_mut(), rgb) {
            let packed = if rgb_is_float {
                parse_value::<f32>(tokens[idx], line_number + 1)?.to_bits()
            } else {
                parse_value::<u32>(tokens[idx], line_number + 1)?
            };
            colors.extend(unpack_rgb(packed));
        }
        if let (Some(normals), Some(idxs)) = (normals.as_mut(), normal) {
            for idx in idxs {
                normals.push(parse_value(tokens[idx], line_number + 1)?);
            }
        }
        count += 1;
    }

    if count != num_points {
        return Err(Error::Parser(format!(
            "PCD header declares {num_points} points but {count} were read"
        )));
    }

    PointCloud::new(
        into_rows(points, count)?,
        normals.map(|normals| into_rows(normals, count)).transpose()?,
        colors.map(|colors| into_rows(colors, count)).transpose()?,
    )
}

fn into_rows<T>(values: Vec<T>, count: usize) -> Result<Array2<T>> {
    Array2::from_shape_vec((count, 3), values)
        .map_err(|err| Error::Parser(format!("Invalid PCD data: {err}")))
}
