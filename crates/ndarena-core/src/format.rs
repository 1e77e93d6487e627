// NDFormat: diagnostic text rendering of arrays
//
//   ND: (3, 1) cpu(0) float64
//   [[123.   ],
//    [  0.123],
//    [   -inf],
//   ]
//
// Every element is first turned into a cell string, then all cells are
// right-aligned to one shared width and laid out row-major with nested
// brackets. How cells are produced depends on the dtype:
//
//   uint8    `0x7F` hex, fixed width by construction
//   integers plain decimal, or scientific when any |v| >= 1e8
//   floats   fixed point with just enough fraction digits (trailing zeros
//            blanked), or scientific when any |v| >= 1e8 or the smallest
//            non-zero |v| < 1e-4. Non-finite values are `inf`, `-inf`, `nan`.
//
// Scientific cells are ` 1.23456789e+02` / `-1.23456789e+02`: a sign slot,
// PRECISION fraction digits and at least two exponent digits. In that mode
// the shared width is the mantissa width, so the literals line up with the
// mantissas.

use crate::array::NDArray;
use crate::context::Context;
use crate::dtype::{decode, DType, WithDType};
use crate::error::Result;
use crate::shape::Shape;

const LF: char = '\n';

/// Fraction digits in scientific notation, and the cap in fixed notation.
const PRECISION: usize = 8;

/// Magnitude at or above which an array switches to scientific notation.
const LARGE: f64 = 1e8;

/// Non-zero magnitude below which a float array switches to scientific notation.
const SMALL: f64 = 1e-4;

/// Render `array` with its header. Fails if the array is closed.
pub fn format(array: &NDArray) -> Result<String> {
    let bytes = array.to_bytes()?;
    Ok(render(
        array.shape()?,
        &array.context()?,
        array.dtype()?,
        &bytes,
    ))
}

/// `ND: <shape> <context> <dtype>`
pub fn header(shape: &Shape, context: &Context, dtype: DType) -> String {
    format!("ND: {shape} {context} {dtype}")
}

/// Render raw little-endian buffer contents of `dtype` laid out as `shape`.
pub fn render(shape: &Shape, context: &Context, dtype: DType, bytes: &[u8]) -> String {
    let cells = match dtype {
        DType::U8 => bytes.iter().map(|b| format!("0x{b:02X}")).collect(),
        DType::I8 => int_cells(&decode::<i8>(bytes)),
        DType::I32 => int_cells(&decode::<i32>(bytes)),
        DType::I64 => int_cells(&decode::<i64>(bytes)),
        DType::F16 => float_cells(&decode::<half::f16>(bytes)),
        DType::F32 => float_cells(&decode::<f32>(bytes)),
        DType::F64 => float_cells(&decode::<f64>(bytes)),
    };

    let mut out = header(shape, context, dtype);
    out.push(LF);
    if cells.len() != shape.elem_count() {
        // Buffer and shape disagree; show what we have flat.
        write_block(&mut out, &[cells.len()], &cells, 0);
    } else {
        write_block(&mut out, shape.dims(), &cells, 0);
    }
    out.push(LF);
    out
}

fn write_block(out: &mut String, dims: &[usize], cells: &[String], depth: usize) {
    match dims {
        [] => {
            if let Some(cell) = cells.first() {
                out.push_str(cell);
            }
        }
        [_] => {
            out.push('[');
            out.push_str(&cells.join(", "));
            out.push(']');
        }
        [n, rest @ ..] => {
            let stride: usize = rest.iter().product();
            out.push('[');
            for i in 0..*n {
                if i > 0 {
                    indent(out, depth + 1);
                }
                write_block(out, rest, &cells[i * stride..(i + 1) * stride], depth + 1);
                out.push(',');
                out.push(LF);
            }
            indent(out, depth);
            out.push(']');
        }
    }
}

fn indent(out: &mut String, depth: usize) {
    out.extend(std::iter::repeat(' ').take(depth));
}

fn int_cells<T: WithDType>(values: &[T]) -> Vec<String> {
    let max = values
        .iter()
        .map(|v| v.to_f64().abs())
        .fold(0.0f64, f64::max);

    if max >= LARGE {
        let cells = values.iter().map(|v| scientific(v.to_f64())).collect();
        return align(cells, Some(PRECISION + 3));
    }
    align(values.iter().map(ToString::to_string).collect(), None)
}

fn float_cells<T: WithDType>(values: &[T]) -> Vec<String> {
    let finite: Vec<(f64, T)> = values
        .iter()
        .map(|&v| (v.to_f64(), v))
        .filter(|(x, _)| x.is_finite())
        .collect();

    let max = finite.iter().map(|(x, _)| x.abs()).fold(0.0f64, f64::max);
    let min_nonzero = finite
        .iter()
        .map(|(x, _)| x.abs())
        .filter(|&a| a > 0.0)
        .fold(f64::INFINITY, f64::min);

    if max >= LARGE || min_nonzero < SMALL {
        let cells = values
            .iter()
            .map(|v| {
                let x = v.to_f64();
                non_finite(x).unwrap_or_else(|| scientific(x))
            })
            .collect();
        return align(cells, Some(PRECISION + 3));
    }

    let precision = finite
        .iter()
        .map(|&(x, v)| fraction_digits(x, v))
        .max()
        .unwrap_or(0);

    let cells = values
        .iter()
        .map(|v| {
            let x = v.to_f64();
            non_finite(x).unwrap_or_else(|| fixed(x, precision))
        })
        .collect();
    align(cells, None)
}

fn non_finite(x: f64) -> Option<String> {
    if x.is_nan() {
        Some("nan".to_string())
    } else if x.is_infinite() {
        Some(if x > 0.0 { "inf" } else { "-inf" }.to_string())
    } else {
        None
    }
}

/// Fewest fraction digits, at most PRECISION, whose decimal text reads back
/// as exactly `v` in its own element type. `x` is `v` widened.
fn fraction_digits<T: WithDType>(x: f64, v: T) -> usize {
    (0..PRECISION)
        .find(|&d| {
            format!("{x:.d$}")
                .parse::<f64>()
                .ok()
                .and_then(T::from_f64)
                == Some(v)
        })
        .unwrap_or(PRECISION)
}

/// Fixed point with `precision` fraction digits; trailing zeros become spaces
/// so the decimal points stay aligned. Integral output keeps a bare `.`.
fn fixed(x: f64, precision: usize) -> String {
    if precision == 0 {
        return format!("{x:.0}.");
    }
    let mut s = format!("{x:.precision$}");
    let zeros = s.len() - s.trim_end_matches('0').len();
    s.truncate(s.len() - zeros);
    s.extend(std::iter::repeat(' ').take(zeros));
    s
}

/// ` d.dddddddde+XX` with a leading sign slot.
fn scientific(x: f64) -> String {
    let s = format!("{:.*e}", PRECISION, x.abs());
    let (mantissa, exp) = s.split_once('e').unwrap_or((s.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let sign = if x.is_sign_negative() { '-' } else { ' ' };
    let exp_sign = if exp < 0 { '-' } else { '+' };
    format!("{sign}{mantissa}e{exp_sign}{:02}", exp.abs())
}

/// Right-align every cell to `width`, or to the widest cell when `None`.
fn align(cells: Vec<String>, width: Option<usize>) -> Vec<String> {
    let width = width.unwrap_or_else(|| {
        cells
            .iter()
            .map(|c| c.chars().count())
            .max()
            .unwrap_or(0)
    });
    cells.into_iter().map(|c| format!("{c:>width$}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::encode;

    fn body<T: WithDType>(dtype: DType, shape: impl Into<Shape>, data: &[T]) -> String {
        let text = render(&shape.into(), &Context::cpu(), dtype, &encode(data));
        let (_, body) = text.split_once(LF).unwrap();
        body.to_string()
    }

    #[test]
    fn test_header() {
        let text = render(&Shape::from(3), &Context::cpu(), DType::U8, &[1, 2, 3]);
        assert!(text.starts_with("ND: (3) cpu(0) uint8\n"));
    }

    #[test]
    fn test_uint8_hex() {
        assert_eq!(body(DType::U8, 3, &[127u8, 128, 1]), "[0x7F, 0x80, 0x01]\n");
    }

    #[test]
    fn test_int8_aligned() {
        assert_eq!(body(DType::I8, 3, &[127i8, -128, 1]), "[ 127, -128,    1]\n");
    }

    #[test]
    fn test_int32_small_and_large() {
        assert_eq!(body(DType::I32, 3, &[1i32, -256, 1000]), "[   1, -256, 1000]\n");
        assert_eq!(
            body(DType::I32, 3, &[i32::MAX, i32::MIN, 1]),
            "[ 2.14748365e+09, -2.14748365e+09,  1.00000000e+00]\n"
        );
    }

    #[test]
    fn test_int64_large() {
        assert_eq!(
            body(DType::I64, 3, &[i64::MAX, i64::MIN, 1]),
            "[ 9.22337204e+18, -9.22337204e+18,  1.00000000e+00]\n"
        );
    }

    #[test]
    fn test_float64_scientific_with_literals() {
        let data = [f64::NEG_INFINITY, f64::MAX, f64::NAN, -1.0];
        assert_eq!(
            body(DType::F64, 4, &data),
            "[       -inf,  1.79769313e+308,         nan, -1.00000000e+00]\n"
        );
    }

    #[test]
    fn test_float64_fixed() {
        let data = [f64::NEG_INFINITY, f64::NAN, -1.0];
        assert_eq!(body(DType::F64, 3, &data), "[-inf,  nan,  -1.]\n");
        assert_eq!(
            body(DType::F64, 2, &[0.123, f64::NEG_INFINITY]),
            "[0.123,  -inf]\n"
        );
        assert_eq!(body(DType::F64, 3, &[1.0, 2.0, 100.0]), "[  1.,   2., 100.]\n");
    }

    #[test]
    fn test_float64_column() {
        let data = [123.0, 0.123, f64::NEG_INFINITY];
        assert_eq!(
            body(DType::F64, (3, 1), &data),
            "[[123.   ],\n [  0.123],\n [   -inf],\n]\n"
        );
    }

    #[test]
    fn test_small_magnitude_goes_scientific() {
        assert_eq!(
            body(DType::F64, 2, &[0.00001, 1.0]),
            "[ 1.00000000e-05,  1.00000000e+00]\n"
        );
    }

    #[test]
    fn test_float32_uses_native_precision() {
        assert_eq!(body(DType::F32, 2, &[0.1f32, 0.25]), "[0.1 , 0.25]\n");
    }

    #[test]
    fn test_float16_uses_native_precision() {
        let data = [half::f16::from_f32(0.1), half::f16::from_f32(0.25)];
        assert_eq!(body(DType::F16, 2, &data), "[0.1 , 0.25]\n");
    }

    #[test]
    fn test_fraction_digits_round_trip() {
        let tenth = half::f16::from_f64(0.1);
        assert_eq!(fraction_digits(tenth.to_f64(), tenth), 1);
        assert_eq!(fraction_digits(0.1f32 as f64, 0.1f32), 1);
        assert_eq!(fraction_digits(-2.0, -2.0f64), 0);
        assert_eq!(fraction_digits(1.0 / 3.0, 1.0f64 / 3.0), PRECISION);
    }

    #[test]
    fn test_cells_generic_over_element_type() {
        let halves = [half::f16::from_f32(0.1), half::f16::from_f32(-2.0)];
        assert_eq!(float_cells(&halves), vec![" 0.1", "-2. "]);
        assert_eq!(int_cells(&[5i32, -12]), vec!["  5", "-12"]);
        assert_eq!(
            int_cells(&[200_000_000i64]),
            vec![" 2.00000000e+08"]
        );
    }

    #[test]
    fn test_three_dims() {
        let data = [1.0f64, 2.0, 3.0, 4.0];
        assert_eq!(
            body(DType::F64, (2, 2, 1), &data),
            "[[[1.],\n  [2.],\n ],\n [[3.],\n  [4.],\n ],\n]\n"
        );
    }

    #[test]
    fn test_scalar_and_empty() {
        assert_eq!(body(DType::I32, (), &[7i32]), "7\n");
        assert_eq!(body(DType::F32, 0, &[] as &[f32]), "[]\n");
    }
}
