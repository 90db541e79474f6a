//! Scalar SQL functions for building, inspecting and comparing vectors
//!
//! Vector arguments may be BLOBs or JSON text. Vector results carry a SQLite
//! subtype naming their element type, so `vec_int8(...)` or `vec_bit(...)`
//! fed into another function is read as int8 or bit. Untagged BLOBs and JSON
//! text are float32 unless the function says otherwise (`vec_int8`,
//! `vec_bit`, `vec_distance_hamming`).

use rusqlite::functions::{Context, FunctionFlags, SqlFnOutput, SubType};
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::os::raw::c_uint;
use vex_core::codec::{self, VectorInput};
use vex_core::{distance, ops, ElementType, Metric, VectorValue, VexError};

type FnResult<T> = vex_core::Result<T>;

pub const SUBTYPE_FLOAT32: c_uint = 223;
pub const SUBTYPE_BIT: c_uint = 224;
pub const SUBTYPE_INT8: c_uint = 225;

pub fn subtype_of(element_type: ElementType) -> c_uint {
    match element_type {
        ElementType::Float32 => SUBTYPE_FLOAT32,
        ElementType::Int8 => SUBTYPE_INT8,
        ElementType::Bit => SUBTYPE_BIT,
    }
}

/// Element type a subtype tag names. JSON's subtype and no subtype at all
/// both mean "untagged".
pub fn element_type_of(subtype: c_uint) -> Option<ElementType> {
    match subtype {
        SUBTYPE_FLOAT32 => Some(ElementType::Float32),
        SUBTYPE_INT8 => Some(ElementType::Int8),
        SUBTYPE_BIT => Some(ElementType::Bit),
        _ => None,
    }
}

fn flags() -> FunctionFlags {
    FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC | FunctionFlags::SQLITE_SUBTYPE
}

fn scalar<T, F>(conn: &Connection, name: &'static str, n_args: i32, f: F) -> rusqlite::Result<()>
where
    T: SqlFnOutput,
    F: Fn(&Context<'_>) -> FnResult<T> + Send + 'static,
{
    scalar_with_flags(conn, name, n_args, flags(), f)
}

fn scalar_with_flags<T, F>(
    conn: &Connection,
    name: &'static str,
    n_args: i32,
    flags: FunctionFlags,
    f: F,
) -> rusqlite::Result<()>
where
    T: SqlFnOutput,
    F: Fn(&Context<'_>) -> FnResult<T> + Send + 'static,
{
    conn.create_scalar_function(name, n_args, flags, move |ctx| {
        f(ctx).map_err(|e| {
            rusqlite::Error::UserFunctionError(format!("{}(): {}", name, e).into())
        })
    })
}

/// Register a function returning a vector, tagged with its element type.
fn vector_fn<F>(conn: &Connection, name: &'static str, n_args: i32, f: F) -> rusqlite::Result<()>
where
    F: Fn(&Context<'_>) -> FnResult<VectorValue> + Send + 'static,
{
    let flags = flags() | FunctionFlags::SQLITE_RESULT_SUBTYPE;
    scalar_with_flags(conn, name, n_args, flags, move |ctx| {
        let value = f(ctx)?;
        let tag: SubType = Some(subtype_of(value.element_type()));
        Ok((codec::encode(&value)?, tag))
    })
}

/// Read argument `index` as a vector. Tagged BLOBs use their tag; untagged
/// BLOBs and JSON text use `untagged`.
fn vector_arg(ctx: &Context<'_>, index: usize, untagged: ElementType) -> FnResult<VectorValue> {
    let (input, element_type) = match ctx.get_raw(index) {
        ValueRef::Blob(bytes) => (
            VectorInput::Blob(bytes),
            element_type_of(ctx.get_subtype(index)).unwrap_or(untagged),
        ),
        ValueRef::Text(text) => (
            VectorInput::Text(std::str::from_utf8(text).map_err(|e| {
                VexError::Parse(format!("argument {} is not valid UTF-8: {}", index + 1, e))
            })?),
            untagged,
        ),
        other => {
            return Err(VexError::TypeMismatch(format!(
                "argument {} must be a vector BLOB or JSON array, got {:?}",
                index + 1,
                other.data_type()
            )))
        }
    };
    codec::coerce(input, element_type, None).map_err(|e| match e {
        VexError::Format(m) => VexError::Format(format!("argument {}: {}", index + 1, m)),
        VexError::Parse(m) => VexError::Parse(format!("argument {}: {}", index + 1, m)),
        other => other,
    })
}

/// Like `vector_arg`, but a BLOB tagged with another element type is an error.
fn typed_arg(ctx: &Context<'_>, index: usize, element_type: ElementType) -> FnResult<VectorValue> {
    let value = vector_arg(ctx, index, element_type)?;
    if value.element_type() != element_type {
        return Err(VexError::TypeMismatch(format!(
            "argument {} must be a {} vector, got {}",
            index + 1,
            element_type,
            value.element_type()
        )));
    }
    Ok(value)
}

fn integer_arg(ctx: &Context<'_>, index: usize) -> FnResult<i64> {
    match ctx.get_raw(index) {
        ValueRef::Integer(i) => Ok(i),
        other => Err(VexError::TypeMismatch(format!(
            "argument {} must be an integer, got {:?}",
            index + 1,
            other.data_type()
        ))),
    }
}

/// Both operands of a binary function. An untagged second operand is read
/// with the first operand's type; tagged operands must agree.
fn pair(ctx: &Context<'_>, untagged: ElementType) -> FnResult<(VectorValue, VectorValue)> {
    let a = vector_arg(ctx, 0, untagged)?;
    let b = vector_arg(ctx, 1, a.element_type())?;
    if a.element_type() != b.element_type() {
        return Err(VexError::TypeMismatch(format!(
            "vector type mismatch: first argument is {}, second is {}",
            a.element_type(),
            b.element_type()
        )));
    }
    Ok((a, b))
}

fn distance_fn(
    conn: &Connection,
    name: &'static str,
    untagged: ElementType,
    metric: Metric,
) -> rusqlite::Result<()> {
    scalar(conn, name, 2, move |ctx| {
        let (a, b) = pair(ctx, untagged)?;
        Ok(distance(&a, &b, metric)? as f64)
    })
}

/// Register every scalar function on `conn`.
pub fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    scalar(conn, "vec_version", 0, |_| Ok(format!("v{}", crate::VERSION)))?;

    vector_fn(conn, "vec_f32", 1, |ctx| typed_arg(ctx, 0, ElementType::Float32))?;
    vector_fn(conn, "vec_int8", 1, |ctx| typed_arg(ctx, 0, ElementType::Int8))?;
    vector_fn(conn, "vec_bit", 1, |ctx| typed_arg(ctx, 0, ElementType::Bit))?;

    scalar(conn, "vec_length", 1, |ctx| {
        Ok(vector_arg(ctx, 0, ElementType::Float32)?.dimension() as i64)
    })?;
    scalar(conn, "vec_type", 1, |ctx| {
        Ok(vector_arg(ctx, 0, ElementType::Float32)?.element_type().name())
    })?;
    scalar(conn, "vec_to_json", 1, |ctx| {
        codec::to_json(&vector_arg(ctx, 0, ElementType::Float32)?)
    })?;

    distance_fn(conn, "vec_distance_l2", ElementType::Float32, Metric::L2)?;
    distance_fn(conn, "vec_distance_l1", ElementType::Float32, Metric::L1)?;
    distance_fn(conn, "vec_distance_cosine", ElementType::Float32, Metric::Cosine)?;
    distance_fn(conn, "vec_distance_hamming", ElementType::Bit, Metric::Hamming)?;

    vector_fn(conn, "vec_add", 2, |ctx| {
        let (a, b) = pair(ctx, ElementType::Float32)?;
        ops::add(&a, &b)
    })?;
    vector_fn(conn, "vec_sub", 2, |ctx| {
        let (a, b) = pair(ctx, ElementType::Float32)?;
        ops::sub(&a, &b)
    })?;
    vector_fn(conn, "vec_slice", 3, |ctx| {
        let v = vector_arg(ctx, 0, ElementType::Float32)?;
        let (start, end) = (integer_arg(ctx, 1)?, integer_arg(ctx, 2)?);
        ops::slice(&v, start, end)
    })?;
    vector_fn(conn, "vec_normalize", 1, |ctx| {
        ops::normalize(&vector_arg(ctx, 0, ElementType::Float32)?)
    })?;

    vector_fn(conn, "vec_quantize_binary", 1, |ctx| {
        ops::quantize_binary(&vector_arg(ctx, 0, ElementType::Float32)?)
    })?;
    vector_fn(conn, "vec_quantize_int8", 2, |ctx| {
        let v = vector_arg(ctx, 0, ElementType::Float32)?;
        match ctx.get_raw(1) {
            ValueRef::Text(b"unit") => ops::quantize_int8_unit(&v),
            other => Err(VexError::Config(format!(
                "argument 2 must be 'unit', got {:?}",
                other
            ))),
        }
    })?;

    Ok(())
}
