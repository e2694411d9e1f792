//! Page text-run extraction.
//!
//! Interprets the text-positioning subset of the content stream operator
//! set (BT/ET, Td, TD, Tm, T*, TL, Tf, Tj, ', ", TJ) plus the q/Q/cm
//! graphics state, producing positioned text runs. Glyph metrics are not
//! consulted: run width is estimated from the character count and font
//! size, which is sufficient for the proximity queries the context
//! extractor performs.

use crate::error::Result;
use crate::lexer::{token, Token};
use crate::object::Object;
use crate::parser::{decode_hex_string, decode_literal_string_escapes, decode_text_string};
use crate::reader::{PageInfo, PdfReader};

/// Average glyph width as a fraction of the font size.
const GLYPH_WIDTH_FACTOR: f64 = 0.5;

/// One positioned run of text on a page.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    /// Decoded text
    pub text: String,
    /// Left edge in user space
    pub x: f64,
    /// Baseline in user space
    pub y: f64,
    /// Estimated width
    pub width: f64,
    /// Estimated height (the font size)
    pub height: f64,
}

impl TextRun {
    /// Center point of the run's bounding box.
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// 2D affine transform `[a b c d e f]`.
#[derive(Debug, Clone, Copy)]
struct Matrix([f64; 6]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn translate(tx: f64, ty: f64) -> Self {
        Matrix([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    /// `self * other` (apply self, then other).
    fn mul(&self, other: &Matrix) -> Matrix {
        let a = &self.0;
        let b = &other.0;
        Matrix([
            a[0] * b[0] + a[1] * b[2],
            a[0] * b[1] + a[1] * b[3],
            a[2] * b[0] + a[3] * b[2],
            a[2] * b[1] + a[3] * b[3],
            a[4] * b[0] + a[5] * b[2] + b[4],
            a[4] * b[1] + a[5] * b[3] + b[5],
        ])
    }

    fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let m = &self.0;
        (m[0] * x + m[2] * y + m[4], m[1] * x + m[3] * y + m[5])
    }

    /// Vertical scale factor, for sizing runs under a scaled CTM.
    fn scale_y(&self) -> f64 {
        (self.0[1].powi(2) + self.0[3].powi(2)).sqrt()
    }
}

/// Extract the text runs of one page, in content order.
pub fn extract_text_runs(reader: &mut PdfReader, page: &PageInfo) -> Result<Vec<TextRun>> {
    let content = page_content(reader, page)?;
    Ok(interpret(&content))
}

/// Concatenated, decoded content-stream bytes of a page.
fn page_content(reader: &mut PdfReader, page: &PageInfo) -> Result<Vec<u8>> {
    let contents = match reader.dict_get(&page.dict, "Contents")? {
        Some(obj) => obj,
        None => return Ok(Vec::new()),
    };

    let mut data = Vec::new();
    match &contents {
        Object::Array(parts) => {
            for part in parts {
                let resolved = reader.resolve_obj(part)?;
                if matches!(resolved, Object::Stream { .. }) {
                    data.extend_from_slice(&resolved.decode_stream_data()?);
                    data.push(b'\n');
                }
            }
        },
        Object::Stream { .. } => data = contents.decode_stream_data()?,
        _ => {},
    }
    Ok(data)
}

/// Interpreter state while walking a content stream.
struct TextState {
    ctm: Matrix,
    ctm_stack: Vec<Matrix>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    font_size: f64,
    leading: f64,
}

impl TextState {
    fn new() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            ctm_stack: Vec::new(),
            text_matrix: Matrix::IDENTITY,
            line_matrix: Matrix::IDENTITY,
            font_size: 12.0,
            leading: 0.0,
        }
    }

    fn next_line(&mut self, tx: f64, ty: f64) {
        self.line_matrix = Matrix::translate(tx, ty).mul(&self.line_matrix);
        self.text_matrix = self.line_matrix;
    }
}

/// Walk the token stream and emit runs for every show operator.
fn interpret(content: &[u8]) -> Vec<TextRun> {
    let mut runs = Vec::new();
    let mut operands: Vec<Object> = Vec::new();
    let mut state = TextState::new();
    let mut input = content;

    while let Ok((rest, tok)) = token(input) {
        input = rest;
        match tok {
            Token::Integer(i) => operands.push(Object::Integer(i)),
            Token::Real(r) => operands.push(Object::Real(r)),
            Token::Name(n) => operands.push(Object::Name(n)),
            Token::LiteralString(raw) => {
                operands.push(Object::String(decode_literal_string_escapes(raw)))
            },
            Token::HexString(raw) => operands.push(Object::String(decode_hex_string(raw))),
            Token::ArrayStart => {
                // Inline TJ array: collect until the matching close
                let mut items = Vec::new();
                loop {
                    match token(input) {
                        Ok((rest, Token::ArrayEnd)) => {
                            input = rest;
                            break;
                        },
                        Ok((rest, Token::Integer(i))) => {
                            items.push(Object::Integer(i));
                            input = rest;
                        },
                        Ok((rest, Token::Real(r))) => {
                            items.push(Object::Real(r));
                            input = rest;
                        },
                        Ok((rest, Token::LiteralString(raw))) => {
                            items.push(Object::String(decode_literal_string_escapes(raw)));
                            input = rest;
                        },
                        Ok((rest, Token::HexString(raw))) => {
                            items.push(Object::String(decode_hex_string(raw)));
                            input = rest;
                        },
                        Ok((rest, _)) => input = rest,
                        Err(_) => break,
                    }
                }
                operands.push(Object::Array(items));
            },
            Token::Operator(op) => {
                apply_operator(op, &operands, &mut state, &mut runs);
                operands.clear();
            },
            // Object-syntax keywords have no meaning in content streams
            _ => operands.clear(),
        }
        if input.is_empty() {
            break;
        }
    }

    runs.retain(|r| !r.text.trim().is_empty());
    runs
}

fn apply_operator(op: &[u8], operands: &[Object], state: &mut TextState, runs: &mut Vec<TextRun>) {
    let num = |i: usize| operands.get(i).and_then(|o| o.as_number());
    match op {
        b"BT" => {
            state.text_matrix = Matrix::IDENTITY;
            state.line_matrix = Matrix::IDENTITY;
        },
        b"ET" => {},
        b"q" => state.ctm_stack.push(state.ctm),
        b"Q" => {
            if let Some(prev) = state.ctm_stack.pop() {
                state.ctm = prev;
            }
        },
        b"cm" => {
            if operands.len() >= 6 {
                let m = Matrix([
                    num(0).unwrap_or(1.0),
                    num(1).unwrap_or(0.0),
                    num(2).unwrap_or(0.0),
                    num(3).unwrap_or(1.0),
                    num(4).unwrap_or(0.0),
                    num(5).unwrap_or(0.0),
                ]);
                state.ctm = m.mul(&state.ctm);
            }
        },
        b"Tf" => {
            if let Some(size) = operands.get(1).and_then(|o| o.as_number()) {
                state.font_size = size;
            }
        },
        b"TL" => {
            if let Some(leading) = num(0) {
                state.leading = leading;
            }
        },
        b"Td" => {
            if let (Some(tx), Some(ty)) = (num(0), num(1)) {
                state.next_line(tx, ty);
            }
        },
        b"TD" => {
            if let (Some(tx), Some(ty)) = (num(0), num(1)) {
                state.leading = -ty;
                state.next_line(tx, ty);
            }
        },
        b"Tm" => {
            if operands.len() >= 6 {
                let m = Matrix([
                    num(0).unwrap_or(1.0),
                    num(1).unwrap_or(0.0),
                    num(2).unwrap_or(0.0),
                    num(3).unwrap_or(1.0),
                    num(4).unwrap_or(0.0),
                    num(5).unwrap_or(0.0),
                ]);
                state.text_matrix = m;
                state.line_matrix = m;
            }
        },
        b"T*" => {
            let leading = state.leading;
            state.next_line(0.0, -leading);
        },
        b"Tj" => {
            if let Some(Object::String(bytes)) = operands.last() {
                show_text(bytes, state, runs);
            }
        },
        b"'" => {
            let leading = state.leading;
            state.next_line(0.0, -leading);
            if let Some(Object::String(bytes)) = operands.last() {
                show_text(bytes, state, runs);
            }
        },
        b"\"" => {
            let leading = state.leading;
            state.next_line(0.0, -leading);
            if let Some(Object::String(bytes)) = operands.get(2) {
                show_text(bytes, state, runs);
            }
        },
        b"TJ" => {
            if let Some(Object::Array(items)) = operands.last() {
                for item in items {
                    match item {
                        Object::String(bytes) => show_text(bytes, state, runs),
                        Object::Integer(_) | Object::Real(_) => {
                            let shift = item.as_number().unwrap_or(0.0);
                            let dx = -shift / 1000.0 * state.font_size;
                            state.text_matrix =
                                Matrix::translate(dx, 0.0).mul(&state.text_matrix);
                        },
                        _ => {},
                    }
                }
            }
        },
        _ => {},
    }
}

/// Emit one run at the current position and advance the text matrix.
fn show_text(bytes: &[u8], state: &mut TextState, runs: &mut Vec<TextRun>) {
    let text = decode_text_string(bytes);
    if text.is_empty() {
        return;
    }

    let device = state.text_matrix.mul(&state.ctm);
    let (x, y) = device.apply(0.0, 0.0);
    let scale = device.scale_y().max(f64::EPSILON);
    let height = state.font_size * scale;
    let advance = text.chars().count() as f64 * state.font_size * GLYPH_WIDTH_FACTOR;

    runs.push(TextRun {
        text,
        x,
        y,
        width: advance * scale,
        height,
    });

    state.text_matrix = Matrix::translate(advance, 0.0).mul(&state.text_matrix);
}
