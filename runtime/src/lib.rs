use std::io::Write;


/// Formats `x` the way C's `printf("%f")` does, including `nan`, `-nan`,
/// `inf` and `-inf`.
pub fn format_f(x: f64) -> String {
    if x.is_nan() {
        if x.is_sign_negative() { "-nan".to_string() } else { "nan".to_string() }
    } else if x.is_infinite() {
        if x < 0.0 { "-inf".to_string() } else { "inf".to_string() }
    } else {
        format!("{:.6}", x)
    }
}


/// putchard - writes the byte `x` to stderr, returns 0.
#[no_mangle]
pub extern "C" fn putchard(x: f64) -> f64 {
    let mut stderr = std::io::stderr();
    let _ = stderr.write_all(&[x as u8]);
    let _ = stderr.flush();
    0.0
}


/// printd - prints `x` as "%f\n" to stderr, returns 0.
#[no_mangle]
pub extern "C" fn printd(x: f64) -> f64 {
    eprintln!("{}", format_f(x));
    0.0
}


#[cfg(test)]
mod test {
    use super::{format_f, putchard, printd};

    #[test]
    fn primitives_return_zero() {
        assert_eq!(putchard(10.0), 0.0);
        assert_eq!(printd(1.5), 0.0);
    }

    #[test]
    fn formatting() {
        assert_eq!(format_f(1.5), "1.500000");
        assert_eq!(format_f(-0.25), "-0.250000");
        assert_eq!(format_f(f64::NAN), "nan");
        assert_eq!(format_f(-f64::NAN), "-nan");
        assert_eq!(format_f(f64::INFINITY), "inf");
        assert_eq!(format_f(f64::NEG_INFINITY), "-inf");
    }
}
