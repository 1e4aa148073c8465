//! Human-readable listing of a prototype tree.

use std::fmt::Write;

use super::instruction::decode_all;
use super::opcode::{OpCode, MULTRET};
use super::proto::{Constant, Proto};
use crate::error::EmberResult;

fn constant_text(constant: &Constant) -> String {
    match constant {
        Constant::Nil => "nil".to_string(),
        Constant::Bool(b) => b.to_string(),
        Constant::Integer(i) => i.to_string(),
        Constant::Number(n) => crate::vm::value::format_number(*n),
        Constant::Str(s) => format!("{s:?}"),
    }
}

fn count_text(count: u16) -> String {
    if count == MULTRET as u16 {
        "*".to_string()
    } else {
        count.to_string()
    }
}

pub fn listing(proto: &Proto) -> EmberResult<String> {
    let mut out = String::new();
    write_proto(&mut out, proto, 0)?;
    Ok(out)
}

fn write_proto(out: &mut String, proto: &Proto, depth: usize) -> EmberResult<()> {
    let indent = "  ".repeat(depth);
    let name = if proto.name.is_empty() { "<main>" } else { &proto.name };
    let _ = writeln!(
        out,
        "{indent}function {name} (line {}, {} params, {} locals, {} constants)",
        proto.line_defined,
        proto.num_params,
        proto.max_locals,
        proto.constants.len()
    );

    for instruction in decode_all(&proto.code)? {
        let op = instruction.opcode;
        let detail = match op {
            OpCode::Push | OpCode::GetGlobal | OpCode::SetGlobal | OpCode::GetField
            | OpCode::SetField | OpCode::Method => proto
                .constants
                .get(instruction.a as usize)
                .map(|c| format!("{}\t; {}", instruction.a, constant_text(c)))
                .unwrap_or_else(|| instruction.a.to_string()),
            OpCode::Call | OpCode::CallVar => {
                format!("{} {}", instruction.a, count_text(instruction.b))
            }
            OpCode::Return => count_text(instruction.a),
            OpCode::ForPrep | OpCode::ForLoop => format!("{} -> {}", instruction.a, instruction.b),
            OpCode::Jump | OpCode::JumpIfFalse | OpCode::JumpIfFalseOrPop
            | OpCode::JumpIfTrueOrPop => format!("-> {}", instruction.a),
            _ if op.operands().len() > 0 => instruction.a.to_string(),
            _ => String::new(),
        };
        let _ = writeln!(
            out,
            "{indent}  {:>5}  {:<18}{}",
            instruction.offset,
            op.mnemonic(),
            detail
        );
    }

    for child in &proto.protos {
        write_proto(out, child, depth + 1)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_constants_inline() {
        let proto = Proto {
            code: vec![OpCode::Push as u8, 0, 0, OpCode::Return as u8, 1],
            constants: vec![Constant::Str("hi".to_string())],
            max_locals: 0,
            ..Proto::default()
        };
        let text = listing(&proto).unwrap();
        assert!(text.contains("PUSH"));
        assert!(text.contains("\"hi\""));
        assert!(text.contains("RETURN"));
    }
}
