//! Arithmetic and comparison primitives over resolved values.
//!
//! Failures come back as error records ready to be thrown.

use std::cmp::Ordering;

use crate::kernel::BinPrim;

use super::value::Value;

type OpResult<T> = Result<T, Value>;

fn type_error(op: BinPrim, a: &Value, b: &Value) -> Value {
    Value::error(
        "TypeError",
        format!("{} is not defined for {} and {}", op.name(), a.type_name(), b.type_name()),
    )
}

fn arithmetic_error(message: &str) -> Value {
    Value::error("ArithmeticError", message)
}

/// Operands after numeric promotion.
enum Pair {
    Int32(i32, i32),
    Int64(i64, i64),
    Flt32(f32, f32),
    Flt64(f64, f64),
    Dec(rust_decimal::Decimal, rust_decimal::Decimal),
}

fn promote(a: &Value, b: &Value) -> Option<Pair> {
    Some(match (a, b) {
        (Value::Int32(x), Value::Int32(y)) => Pair::Int32(*x, *y),
        (Value::Int32(x), Value::Int64(y)) => Pair::Int64(i64::from(*x), *y),
        (Value::Int64(x), Value::Int32(y)) => Pair::Int64(*x, i64::from(*y)),
        (Value::Int64(x), Value::Int64(y)) => Pair::Int64(*x, *y),
        (Value::Flt32(x), Value::Flt32(y)) => Pair::Flt32(*x, *y),
        (Value::Flt32(x), Value::Flt64(y)) => Pair::Flt64(f64::from(*x), *y),
        (Value::Flt64(x), Value::Flt32(y)) => Pair::Flt64(*x, f64::from(*y)),
        (Value::Flt64(x), Value::Flt64(y)) => Pair::Flt64(*x, *y),
        (Value::Dec128(x), Value::Dec128(y)) => Pair::Dec(*x, *y),
        _ => return None,
    })
}

pub fn arith(op: BinPrim, a: &Value, b: &Value) -> OpResult<Value> {
    if let (BinPrim::Add, Value::Str(x), Value::Str(y)) = (op, a, b) {
        return Ok(Value::str(&format!("{x}{y}")));
    }
    let Some(pair) = promote(a, b) else {
        return Err(type_error(op, a, b));
    };
    match pair {
        Pair::Int32(x, y) => int_op(op, x, y).map(Value::Int32),
        Pair::Int64(x, y) => int_op(op, x, y).map(Value::Int64),
        Pair::Flt32(x, y) => float_op(op, x, y).map(Value::Flt32),
        Pair::Flt64(x, y) => float_op(op, x, y).map(Value::Flt64),
        Pair::Dec(x, y) => {
            let result = match op {
                BinPrim::Add => x.checked_add(y),
                BinPrim::Sub => x.checked_sub(y),
                BinPrim::Mult => x.checked_mul(y),
                BinPrim::Div => x.checked_div(y),
                BinPrim::Mod => x.checked_rem(y),
                _ => return Err(type_error(op, a, b)),
            };
            result
                .map(Value::Dec128)
                .ok_or_else(|| arithmetic_error("decimal overflow or division by zero"))
        }
    }
}

trait CheckedInt: Copy {
    fn checked(op: BinPrim, x: Self, y: Self) -> Option<Self>;
}

impl CheckedInt for i32 {
    fn checked(op: BinPrim, x: i32, y: i32) -> Option<i32> {
        match op {
            BinPrim::Add => x.checked_add(y),
            BinPrim::Sub => x.checked_sub(y),
            BinPrim::Mult => x.checked_mul(y),
            BinPrim::Div => x.checked_div(y),
            BinPrim::Mod => x.checked_rem(y),
            _ => None,
        }
    }
}

impl CheckedInt for i64 {
    fn checked(op: BinPrim, x: i64, y: i64) -> Option<i64> {
        match op {
            BinPrim::Add => x.checked_add(y),
            BinPrim::Sub => x.checked_sub(y),
            BinPrim::Mult => x.checked_mul(y),
            BinPrim::Div => x.checked_div(y),
            BinPrim::Mod => x.checked_rem(y),
            _ => None,
        }
    }
}

fn int_op<T: CheckedInt + PartialEq + Default>(op: BinPrim, x: T, y: T) -> OpResult<T> {
    if matches!(op, BinPrim::Div | BinPrim::Mod) && y == T::default() {
        return Err(arithmetic_error("division by zero"));
    }
    T::checked(op, x, y).ok_or_else(|| arithmetic_error("integer overflow"))
}

/// Floats follow IEEE 754: division by zero yields an infinity or NaN.
fn float_op<T>(op: BinPrim, x: T, y: T) -> OpResult<T>
where
    T: std::ops::Add<Output = T>
        + std::ops::Sub<Output = T>
        + std::ops::Mul<Output = T>
        + std::ops::Div<Output = T>
        + std::ops::Rem<Output = T>,
{
    match op {
        BinPrim::Add => Ok(x + y),
        BinPrim::Sub => Ok(x - y),
        BinPrim::Mult => Ok(x * y),
        BinPrim::Div => Ok(x / y),
        BinPrim::Mod => Ok(x % y),
        _ => Err(arithmetic_error("not an arithmetic operator")),
    }
}

pub fn negate(a: &Value) -> OpResult<Value> {
    match a {
        Value::Int32(n) => n.checked_neg().map(Value::Int32).ok_or_else(|| arithmetic_error("integer overflow")),
        Value::Int64(n) => n.checked_neg().map(Value::Int64).ok_or_else(|| arithmetic_error("integer overflow")),
        Value::Flt32(f) => Ok(Value::Flt32(-*f)),
        Value::Flt64(f) => Ok(Value::Flt64(-*f)),
        Value::Dec128(d) => Ok(Value::Dec128(-*d)),
        other => Err(Value::error(
            "TypeError",
            format!("$negate is not defined for {}", other.type_name()),
        )),
    }
}

/// `$lt $gt $le $ge` over one family: integers, floats, decimals, strings
/// or chars.
pub fn compare(op: BinPrim, a: &Value, b: &Value) -> OpResult<bool> {
    let ordering = match (a, b) {
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
        (Value::Char(x), Value::Char(y)) => Some(x.cmp(y)),
        _ => match promote(a, b) {
            Some(Pair::Int32(x, y)) => Some(x.cmp(&y)),
            Some(Pair::Int64(x, y)) => Some(x.cmp(&y)),
            Some(Pair::Flt32(x, y)) => x.partial_cmp(&y),
            Some(Pair::Flt64(x, y)) => x.partial_cmp(&y),
            Some(Pair::Dec(x, y)) => Some(x.cmp(&y)),
            None => return Err(type_error(op, a, b)),
        },
    };
    // NaN compares false both ways
    let Some(ordering) = ordering else {
        return Ok(false);
    };
    Ok(match op {
        BinPrim::Lt => ordering == Ordering::Less,
        BinPrim::Gt => ordering == Ordering::Greater,
        BinPrim::Le => ordering != Ordering::Greater,
        BinPrim::Ge => ordering != Ordering::Less,
        _ => return Err(type_error(op, a, b)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn err_name(result: OpResult<Value>) -> String {
        result.unwrap_err().error_name().unwrap().to_string()
    }

    #[test]
    fn int32_stays_int32() {
        assert!(matches!(arith(BinPrim::Add, &Value::Int32(2), &Value::Int32(3)), Ok(Value::Int32(5))));
    }

    #[test]
    fn int64_on_either_side_widens() {
        assert!(matches!(arith(BinPrim::Add, &Value::Int32(2), &Value::Int64(3)), Ok(Value::Int64(5))));
        assert!(matches!(arith(BinPrim::Mult, &Value::Int64(2), &Value::Int32(3)), Ok(Value::Int64(6))));
    }

    #[test]
    fn float_promotion() {
        assert!(matches!(arith(BinPrim::Add, &Value::Flt32(1.5), &Value::Flt32(1.0)), Ok(Value::Flt32(_))));
        assert!(matches!(arith(BinPrim::Add, &Value::Flt32(1.5), &Value::Flt64(1.0)), Ok(Value::Flt64(_))));
        match arith(BinPrim::Div, &Value::Flt64(1.0), &Value::Flt64(0.0)) {
            Ok(Value::Flt64(f)) => assert!(f.is_infinite()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn overflow_and_division_by_zero() {
        assert_eq!(err_name(arith(BinPrim::Add, &Value::Int32(i32::MAX), &Value::Int32(1))), "ArithmeticError");
        assert_eq!(err_name(arith(BinPrim::Div, &Value::Int64(1), &Value::Int64(0))), "ArithmeticError");
        assert_eq!(err_name(arith(BinPrim::Mod, &Value::Int32(1), &Value::Int32(0))), "ArithmeticError");
        assert_eq!(
            err_name(arith(BinPrim::Div, &Value::Dec128(Decimal::ONE), &Value::Dec128(Decimal::ZERO))),
            "ArithmeticError"
        );
        assert_eq!(err_name(negate(&Value::Int32(i32::MIN))), "ArithmeticError");
    }

    #[test]
    fn decimals() {
        let x = Value::Dec128(Decimal::new(15, 1));
        match arith(BinPrim::Mult, &x, &x) {
            Ok(Value::Dec128(d)) => assert_eq!(d, Decimal::new(225, 2)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn strings_concatenate() {
        match arith(BinPrim::Add, &Value::str("ab"), &Value::str("cd")) {
            Ok(Value::Str(s)) => assert_eq!(&*s, "abcd"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(err_name(arith(BinPrim::Sub, &Value::str("a"), &Value::str("b"))), "TypeError");
    }

    #[test]
    fn mixed_families_are_type_errors() {
        assert_eq!(err_name(arith(BinPrim::Add, &Value::Int32(1), &Value::Flt64(1.0))), "TypeError");
        let err = compare(BinPrim::Lt, &Value::Int32(1), &Value::str("a")).unwrap_err();
        assert_eq!(err.error_name(), Some("TypeError"));
    }

    #[test]
    fn comparisons() {
        assert!(matches!(compare(BinPrim::Lt, &Value::Int32(1), &Value::Int64(2)), Ok(true)));
        assert!(matches!(compare(BinPrim::Ge, &Value::Char('b'), &Value::Char('a')), Ok(true)));
        assert!(matches!(compare(BinPrim::Le, &Value::str("b"), &Value::str("a")), Ok(false)));
        assert!(matches!(compare(BinPrim::Gt, &Value::Flt64(f64::NAN), &Value::Flt64(0.0)), Ok(false)));
    }
}
