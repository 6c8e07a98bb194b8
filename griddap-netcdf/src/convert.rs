//! Moving values between netCDF's native types and the `f64` arrays everything else works with.
//!
use griddap::{AttrValue, Attributes, DataType, VariableDef};
use log::debug;
use netcdf::{
    types::{FloatType, IntType, NcVariableType},
    AttributeValue, NcTypeDescriptor,
};
use num_traits::AsPrimitive;

pub(crate) type NcResult<T> = std::result::Result<T, netcdf::Error>;

/// Our type for a netCDF variable type. `None` for types that can't be read as numbers.
///
pub(crate) fn data_type(vartype: &NcVariableType) -> Option<DataType> {
    match vartype {
        NcVariableType::Int(IntType::I8) => Some(DataType::I8),
        NcVariableType::Int(IntType::U8) => Some(DataType::U8),
        NcVariableType::Int(IntType::I16) => Some(DataType::I16),
        NcVariableType::Int(IntType::U16) => Some(DataType::U16),
        NcVariableType::Int(IntType::I32) => Some(DataType::I32),
        NcVariableType::Int(IntType::U32) => Some(DataType::U32),
        NcVariableType::Int(IntType::I64) => Some(DataType::I64),
        NcVariableType::Float(FloatType::F32) => Some(DataType::F32),
        NcVariableType::Float(FloatType::F64) => Some(DataType::F64),
        _ => None,
    }
}

/// Value netCDF stores in samples that were never written, when a variable has no `_FillValue`
///
pub(crate) fn default_fill(dtype: DataType) -> f64 {
    match dtype {
        DataType::I8 => -127.0,
        DataType::U8 => 255.0,
        DataType::I16 => -32767.0,
        DataType::U16 => 65535.0,
        DataType::I32 => -2147483647.0,
        DataType::U32 => 4294967295.0,
        DataType::I64 => -9223372036854775806.0,
        DataType::F32 | DataType::F64 => 9.9692099683868690e+36,
    }
}

fn get<T>(var: &netcdf::Variable, start: &[usize], count: &[usize]) -> NcResult<Vec<f64>>
where
    T: NcTypeDescriptor + Copy + AsPrimitive<f64>,
{
    let values = if start.is_empty() {
        var.get_values::<T, _>(..)?
    } else {
        var.get_values::<T, _>((start, count))?
    };

    Ok(values.into_iter().map(AsPrimitive::as_).collect())
}

/// Read the hyperslab of `var` at `start` with extent `count`, in the variable's own type.
///
/// Empty `start` and `count` read the whole of a scalar.
///
pub(crate) fn read(
    var: &netcdf::Variable,
    dtype: DataType,
    start: &[usize],
    count: &[usize],
) -> NcResult<Vec<f64>> {
    match dtype {
        DataType::I8 => get::<i8>(var, start, count),
        DataType::U8 => get::<u8>(var, start, count),
        DataType::I16 => get::<i16>(var, start, count),
        DataType::U16 => get::<u16>(var, start, count),
        DataType::I32 => get::<i32>(var, start, count),
        DataType::U32 => get::<u32>(var, start, count),
        DataType::I64 => get::<i64>(var, start, count),
        DataType::F32 => get::<f32>(var, start, count),
        DataType::F64 => get::<f64>(var, start, count),
    }
}

fn put<T>(var: &mut netcdf::VariableMut, values: &[f64], start: &[usize], count: &[usize]) -> NcResult<()>
where
    T: NcTypeDescriptor + Copy + 'static,
    f64: AsPrimitive<T>,
{
    let values: Vec<T> = values.iter().map(|&value| value.as_()).collect();
    if start.is_empty() {
        var.put_values(&values, ..)
    } else {
        var.put_values(&values, (start, count))
    }
}

/// Write `values`, already coerced to `dtype`, to the hyperslab of `var` at `start`
///
pub(crate) fn write(
    var: &mut netcdf::VariableMut,
    dtype: DataType,
    values: &[f64],
    start: &[usize],
    count: &[usize],
) -> NcResult<()> {
    match dtype {
        DataType::I8 => put::<i8>(var, values, start, count),
        DataType::U8 => put::<u8>(var, values, start, count),
        DataType::I16 => put::<i16>(var, values, start, count),
        DataType::U16 => put::<u16>(var, values, start, count),
        DataType::I32 => put::<i32>(var, values, start, count),
        DataType::U32 => put::<u32>(var, values, start, count),
        DataType::I64 => put::<i64>(var, values, start, count),
        DataType::F32 => put::<f32>(var, values, start, count),
        DataType::F64 => put::<f64>(var, values, start, count),
    }
}

/// Add a variable of the type `def` asks for
///
pub(crate) fn add_variable<'f>(
    file: &'f mut netcdf::FileMut,
    def: &VariableDef,
) -> NcResult<netcdf::VariableMut<'f>> {
    let dims: Vec<&str> = def.dimensions.iter().map(String::as_str).collect();
    match def.dtype {
        DataType::I8 => file.add_variable::<i8>(&def.name, &dims),
        DataType::U8 => file.add_variable::<u8>(&def.name, &dims),
        DataType::I16 => file.add_variable::<i16>(&def.name, &dims),
        DataType::U16 => file.add_variable::<u16>(&def.name, &dims),
        DataType::I32 => file.add_variable::<i32>(&def.name, &dims),
        DataType::U32 => file.add_variable::<u32>(&def.name, &dims),
        DataType::I64 => file.add_variable::<i64>(&def.name, &dims),
        DataType::F32 => file.add_variable::<f32>(&def.name, &dims),
        DataType::F64 => file.add_variable::<f64>(&def.name, &dims),
    }
}

/// Set a variable's fill value. `fill` must already be coerced to `dtype`.
///
pub(crate) fn set_fill_value(var: &mut netcdf::VariableMut, dtype: DataType, fill: f64) -> NcResult<()> {
    match dtype {
        DataType::I8 => var.set_fill_value::<i8>(fill.as_()),
        DataType::U8 => var.set_fill_value::<u8>(fill.as_()),
        DataType::I16 => var.set_fill_value::<i16>(fill.as_()),
        DataType::U16 => var.set_fill_value::<u16>(fill.as_()),
        DataType::I32 => var.set_fill_value::<i32>(fill.as_()),
        DataType::U32 => var.set_fill_value::<u32>(fill.as_()),
        DataType::I64 => var.set_fill_value::<i64>(fill.as_()),
        DataType::F32 => var.set_fill_value::<f32>(fill.as_()),
        DataType::F64 => var.set_fill_value::<f64>(fill),
    }
}

fn numbers<T: AsPrimitive<f64>>(values: Vec<T>) -> AttrValue {
    AttrValue::Numbers(values.into_iter().map(AsPrimitive::as_).collect())
}

/// Our value for a netCDF attribute value. `None` for values that are neither text nor numbers.
///
pub(crate) fn attr_value(value: AttributeValue) -> Option<AttrValue> {
    let value = match value {
        AttributeValue::Str(text) => AttrValue::Text(text),
        AttributeValue::Strs(texts) => AttrValue::Text(texts.join(" ")),
        AttributeValue::Schar(n) => numbers(vec![n]),
        AttributeValue::Schars(ns) => numbers(ns),
        AttributeValue::Uchar(n) => numbers(vec![n]),
        AttributeValue::Uchars(ns) => numbers(ns),
        AttributeValue::Short(n) => numbers(vec![n]),
        AttributeValue::Shorts(ns) => numbers(ns),
        AttributeValue::Ushort(n) => numbers(vec![n]),
        AttributeValue::Ushorts(ns) => numbers(ns),
        AttributeValue::Int(n) => numbers(vec![n]),
        AttributeValue::Ints(ns) => numbers(ns),
        AttributeValue::Uint(n) => numbers(vec![n]),
        AttributeValue::Uints(ns) => numbers(ns),
        AttributeValue::Longlong(n) => numbers(vec![n]),
        AttributeValue::Longlongs(ns) => numbers(ns),
        AttributeValue::Ulonglong(n) => numbers(vec![n]),
        AttributeValue::Ulonglongs(ns) => numbers(ns),
        AttributeValue::Float(n) => numbers(vec![n]),
        AttributeValue::Floats(ns) => numbers(ns),
        AttributeValue::Double(n) => AttrValue::Numbers(vec![n]),
        AttributeValue::Doubles(ns) => AttrValue::Numbers(ns),
        #[allow(unreachable_patterns)]
        _ => return None,
    };

    Some(value)
}

/// The netCDF attribute value for one of ours. Numbers are always stored as doubles.
///
pub(crate) fn nc_value(value: &AttrValue) -> AttributeValue {
    match value {
        AttrValue::Text(text) => AttributeValue::Str(text.clone()),
        AttrValue::Numbers(numbers) if numbers.len() == 1 => AttributeValue::Double(numbers[0]),
        AttrValue::Numbers(numbers) => AttributeValue::Doubles(numbers.clone()),
    }
}

/// Collect attributes, skipping any that can't be read or converted
///
pub(crate) fn attributes<'a, I>(attributes: I) -> Attributes
where
    I: Iterator<Item = netcdf::Attribute<'a>>,
{
    let mut collected = Attributes::new();
    for attribute in attributes {
        let name = attribute.name().to_string();
        match attribute.value() {
            Ok(value) => match attr_value(value) {
                Some(value) => {
                    collected.insert(name, value);
                }
                None => debug!("skipping attribute {name} of unsupported type"),
            },
            Err(err) => debug!("skipping unreadable attribute {name}: {err}"),
        }
    }

    collected
}
