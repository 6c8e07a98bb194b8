use std::path::Path;

use chrono::{Duration, NaiveDate};
use griddap::{Result, Timestamp};

use crate::{convert::NcResult, status::store_error};

pub(crate) const ROWS: usize = 6;
pub(crate) const COLS: usize = 8;
pub(crate) const LEVELS: usize = 3;

pub(crate) fn hour(hour: usize) -> Timestamp {
    NaiveDate::from_ymd_opt(2020, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + Duration::hours(hour as i64)
}

pub(crate) fn hourly(n: usize) -> Vec<Timestamp> {
    (0..n).map(hour).collect()
}

/// Value of a gridded test variable, encodes where it came from so tests can check placement
///
pub(crate) fn value(hour: usize, level: usize, row: usize, col: usize) -> f64 {
    (hour * 1000 + level * 100 + row * 10 + col) as f64
}

pub(crate) fn bathymetry(row: usize, col: usize) -> f64 {
    (row * 100 + col) as f64 + 0.5
}

/// Write an ocean model output file with `n` hourly records starting at `first_hour`.
///
/// Has coordinates `time`, `depth`, `lat` and `lon`, a 4D `temp`, a 3D `ssh` and a 2D `h`.
///
pub(crate) fn ocean_file(path: &Path, first_hour: usize, n: usize) -> Result<()> {
    write_ocean_file(path, first_hour, n)
        .map_err(|err| store_error(&format!("writing {}", path.display()), err))
}

fn write_ocean_file(path: &Path, first_hour: usize, n: usize) -> NcResult<()> {
    let mut file = netcdf::create(path)?;
    file.add_attribute("title", "test ocean model output")?;

    file.add_unlimited_dimension("time")?;
    file.add_dimension("depth", LEVELS)?;
    file.add_dimension("lat", ROWS)?;
    file.add_dimension("lon", COLS)?;

    let hours: Vec<usize> = (first_hour..first_hour + n).collect();
    {
        let mut time = file.add_variable::<f64>("time", &["time"])?;
        time.put_attribute("units", "hours since 2020-01-01 00:00:00")?;
        time.put_attribute("long_name", "time")?;
        let times: Vec<f64> = hours.iter().map(|&h| h as f64).collect();
        time.put_values(&times, (&[0_usize][..], &[n][..]))?;
    }

    {
        let mut depth = file.add_variable::<f64>("depth", &["depth"])?;
        depth.put_attribute("units", "m")?;
        depth.put_attribute("positive", "down")?;
        let depths: Vec<f64> = (0..LEVELS).map(|k| k as f64 * 10.0).collect();
        depth.put_values(&depths, ..)?;
    }

    {
        let mut lat = file.add_variable::<f64>("lat", &["lat"])?;
        lat.put_attribute("units", "degrees_north")?;
        let lats: Vec<f64> = (0..ROWS).map(|j| -35.0 + j as f64).collect();
        lat.put_values(&lats, ..)?;
    }

    {
        let mut lon = file.add_variable::<f64>("lon", &["lon"])?;
        lon.put_attribute("units", "degrees_east")?;
        let lons: Vec<f64> = (0..COLS).map(|i| 110.0 + i as f64).collect();
        lon.put_values(&lons, ..)?;
    }

    {
        let mut temp = file.add_variable::<f32>("temp", &["time", "depth", "lat", "lon"])?;
        temp.set_fill_value(-999.0_f32)?;
        temp.put_attribute("units", "degC")?;
        let mut values = Vec::with_capacity(n * LEVELS * ROWS * COLS);
        for &h in &hours {
            for k in 0..LEVELS {
                for j in 0..ROWS {
                    for i in 0..COLS {
                        values.push(value(h, k, j, i) as f32);
                    }
                }
            }
        }
        temp.put_values(&values, (&[0_usize; 4][..], &[n, LEVELS, ROWS, COLS][..]))?;
    }

    {
        let mut ssh = file.add_variable::<f32>("ssh", &["time", "lat", "lon"])?;
        ssh.set_fill_value(-999.0_f32)?;
        ssh.put_attribute("units", "m")?;
        let mut values = Vec::with_capacity(n * ROWS * COLS);
        for &h in &hours {
            for j in 0..ROWS {
                for i in 0..COLS {
                    values.push(value(h, 0, j, i) as f32);
                }
            }
        }
        ssh.put_values(&values, (&[0_usize; 3][..], &[n, ROWS, COLS][..]))?;
    }

    {
        let mut h = file.add_variable::<f64>("h", &["lat", "lon"])?;
        h.put_attribute("units", "m")?;
        h.put_attribute("long_name", "bathymetry")?;
        let mut values = Vec::with_capacity(ROWS * COLS);
        for j in 0..ROWS {
            for i in 0..COLS {
                values.push(bathymetry(j, i));
            }
        }
        h.put_values(&values, ..)?;
    }

    Ok(())
}
