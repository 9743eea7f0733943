//! Binary on-disk format for the three grid types.
//!
//! Each file starts with a fixed ASCII preamble identifying the grid type,
//! followed by explicit dimensions, resolutions and the little-endian f32
//! payload. Reading rejects files whose preamble does not match.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use binrw::{binrw, BinRead, BinWrite};
use ndarray::Array2;

use crate::backprojection::Backprojection;
use crate::filter::FilteredProjections;
use crate::projections::Projections;
use crate::Error;

#[binrw]
#[brw(little, magic = b"TOMOSIM PROJECTIONS v1\0")]
struct ProjectionsFile {
    n_angles: u32,
    n_distances: u32,
    angle_resolution: f32,
    distance_resolution: f32,
    #[br(count = n_angles as usize * n_distances as usize)]
    data: Vec<f32>,
}

#[binrw]
#[brw(little, magic = b"TOMOSIM FILTERED v1\0")]
struct FilteredFile {
    n_angles: u32,
    n_distances: u32,
    angle_resolution: f32,
    distance_resolution: f32,
    #[br(count = n_angles as usize * n_distances as usize)]
    data: Vec<f32>,
}

#[binrw]
#[brw(little, magic = b"TOMOSIM BACKPROJECTION v1\0")]
struct BackprojectionFile {
    side: u32,
    pixel_size: f32,
    #[br(count = side as usize * side as usize)]
    data: Vec<f32>,
}

fn to_array2(data: Vec<f32>, rows: usize, cols: usize) -> Result<Array2<f32>, Error> {
    Array2::from_shape_vec((rows, cols), data).map_err(|_| Error::Format)
}

pub fn write_projections(projections: &Projections, path: &Path) -> Result<(), Error> {
    let file = ProjectionsFile {
        n_angles: projections.n_angles() as u32,
        n_distances: projections.n_distances() as u32,
        angle_resolution: projections.angle_resolution,
        distance_resolution: projections.distance_resolution,
        data: projections.data.iter().copied().collect(),
    };
    let mut out = BufWriter::new(File::create(path)?);
    file.write(&mut out)?;
    Ok(())
}

pub fn read_projections(path: &Path) -> Result<Projections, Error> {
    let mut input = BufReader::new(File::open(path)?);
    let file = ProjectionsFile::read(&mut input)?;
    let data = to_array2(file.data, file.n_angles as usize, file.n_distances as usize)?;
    Ok(Projections::from_parts(data, file.angle_resolution, file.distance_resolution))
}

pub fn write_filtered(filtered: &FilteredProjections, path: &Path) -> Result<(), Error> {
    let file = FilteredFile {
        n_angles: filtered.n_angles() as u32,
        n_distances: filtered.n_distances() as u32,
        angle_resolution: filtered.angle_resolution,
        distance_resolution: filtered.distance_resolution,
        data: filtered.data.iter().copied().collect(),
    };
    let mut out = BufWriter::new(File::create(path)?);
    file.write(&mut out)?;
    Ok(())
}

pub fn read_filtered(path: &Path) -> Result<FilteredProjections, Error> {
    let mut input = BufReader::new(File::open(path)?);
    let file = FilteredFile::read(&mut input)?;
    let data = to_array2(file.data, file.n_angles as usize, file.n_distances as usize)?;
    Ok(FilteredProjections {
        data,
        angle_resolution: file.angle_resolution,
        distance_resolution: file.distance_resolution,
    })
}

pub fn write_backprojection(image: &Backprojection, path: &Path) -> Result<(), Error> {
    let file = BackprojectionFile {
        side: image.side() as u32,
        pixel_size: image.pixel_size,
        data: image.data.iter().copied().collect(),
    };
    let mut out = BufWriter::new(File::create(path)?);
    file.write(&mut out)?;
    Ok(())
}

pub fn read_backprojection(path: &Path) -> Result<Backprojection, Error> {
    let mut input = BufReader::new(File::open(path)?);
    let file = BackprojectionFile::read(&mut input)?;
    let data = to_array2(file.data, file.side as usize, file.side as usize)?;
    Ok(Backprojection::from_parts(data, file.pixel_size))
}
