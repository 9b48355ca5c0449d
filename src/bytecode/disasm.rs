use crate::bytecode::{Op, ProgramImage};
use std::collections::HashMap;
use std::fmt::Write;

/// Print a listing of an assembled program to stdout.
pub fn print_image(image: &ProgramImage) {
    print!("{}", render(image));
}

/// Render the listing: one line per instruction, with code addresses,
/// branch-target markers, and label annotations from the image's label map.
pub fn render(image: &ProgramImage) -> String {
    let targets = collect_branch_targets(&image.ops);
    let names = label_names(image);

    let mut out = String::new();
    for (index, op) in image.ops.iter().enumerate() {
        let marker = if targets.contains(&index) { '►' } else { ' ' };
        let _ = writeln!(out, "{:04} {} {}", index, marker, format_op(op, index, &names));
    }
    out
}

fn collect_branch_targets(ops: &[Op]) -> Vec<usize> {
    let mut targets = Vec::new();

    for op in ops {
        let target = match op {
            Op::Jmp(t) | Op::Jmpf(t) | Op::Call(t) => Some(*t),
            _ => None,
        };
        if let Some(t) = target {
            if !targets.contains(&t) {
                targets.push(t);
            }
        }
    }

    targets
}

fn label_names(image: &ProgramImage) -> HashMap<usize, &str> {
    image
        .labels
        .iter()
        .map(|(name, index)| (*index, name.as_str()))
        .collect()
}

fn format_op(op: &Op, index: usize, names: &HashMap<usize, &str>) -> String {
    match op {
        // a shadowed marker has no surviving name in the label map
        Op::Marker => match names.get(&index) {
            Some(name) => format!("{} NULL", name),
            None => String::from("NULL"),
        },
        Op::Ldc(k) => format!("{:<8}{}", op.mnemonic(), k),
        Op::Ldv(n) | Op::Str(n) => format!("{:<8}{}", op.mnemonic(), n),
        Op::Jmp(t) | Op::Jmpf(t) | Op::Call(t) => match names.get(t) {
            Some(name) => format!("{:<8}{:04}    ; {}", op.mnemonic(), t, name),
            None => format!("{:<8}{:04}", op.mnemonic(), t),
        },
        Op::Alloc { base, count } | Op::Dalloc { base, count } => {
            format!("{:<8}{},{}", op.mnemonic(), base, count)
        }
        other => other.mnemonic().to_string(),
    }
}
