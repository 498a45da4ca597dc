//! Flat, versioned binary serialization of a [`Circuit`].
//!
//! Stream layout:
//!
//! ```text
//! [magic "CIRC"] [version u16] [node_count u32]
//! ( [id u32] [kind_tag u8] [payload] [width u32]
//!   [operand_count u32] [operand_id u32]*
//!   [meta_count u32] ([key] [value])* )+
//! [root_id u32]
//! ```
//!
//! Integers are little-endian; strings are length-prefixed UTF-8.
//! Nodes are emitted in topological order, so an operand id always
//! refers to an already-defined node; a forward reference is a
//! [`SerializeError`]. Round-tripping preserves ids exactly.

use std::io::{Read, Write};

use thiserror::Error;

use crate::ir::{Circuit, IcmpPred, KindTag, OpId, OpKind, TypingError};
use crate::util::{HashSet, IndexMap};

const MAGIC: [u8; 4] = *b"CIRC";
const VERSION: u16 = 1;
const NO_ROOT: u32 = u32::MAX;

/// Errors reported while reading or writing the binary stream.
#[derive(Debug, Error)]
pub enum SerializeError {
    /// Underlying stream failure, including truncation.
    #[error("stream error: {0}")]
    Io(#[from] std::io::Error),
    /// The stream does not start with the `CIRC` magic.
    #[error("bad magic: not a serialized circuit")]
    BadMagic,
    /// The stream version is not understood.
    #[error("unsupported version {0}")]
    BadVersion(u16),
    /// An unknown kind tag byte.
    #[error("unknown kind tag {0}")]
    BadKindTag(u8),
    /// A node referenced an operand defined later (or never).
    #[error("node {node} references undefined operand {operand}")]
    DanglingOperand {
        /// The referencing node.
        node: OpId,
        /// The undefined operand id.
        operand: OpId,
    },
    /// Two nodes in the stream carry the same id.
    #[error("id {0} defined twice")]
    DuplicateId(OpId),
    /// The recorded root id does not name the circuit's root node.
    #[error("root id {0} does not match the deserialized root")]
    RootMismatch(u32),
    /// A string field is not valid UTF-8.
    #[error("malformed string field")]
    BadString,
    /// A deserialized node violates its kind's typing rule.
    #[error(transparent)]
    Typing(#[from] TypingError),
}

fn kind_tag_byte(kind: &OpKind) -> u8 {
    kind.tag() as u8
}

fn tag_from_byte(byte: u8) -> Result<KindTag, SerializeError> {
    const TAGS: [KindTag; 28] = [
        KindTag::InputRegister,
        KindTag::OutputRegister,
        KindTag::Constant,
        KindTag::Advice,
        KindTag::Undefined,
        KindTag::InputInstructionBits,
        KindTag::Add,
        KindTag::Sub,
        KindTag::Mul,
        KindTag::And,
        KindTag::Or,
        KindTag::Xor,
        KindTag::Not,
        KindTag::Shl,
        KindTag::LShr,
        KindTag::AShr,
        KindTag::Icmp,
        KindTag::Select,
        KindTag::Concat,
        KindTag::Extract,
        KindTag::ZExt,
        KindTag::SExt,
        KindTag::Parity,
        KindTag::PopCount,
        KindTag::DecodeCondition,
        KindTag::VerifyInstruction,
        KindTag::RegConstraint,
        KindTag::Circuit,
    ];
    TAGS.get(byte as usize)
        .copied()
        .ok_or(SerializeError::BadKindTag(byte))
}

struct Writer<W> {
    sink: W,
}

impl<W: Write> Writer<W> {
    fn u8(&mut self, v: u8) -> Result<(), SerializeError> {
        self.sink.write_all(&[v])?;
        Ok(())
    }

    fn u16(&mut self, v: u16) -> Result<(), SerializeError> {
        self.sink.write_all(&v.to_le_bytes())?;
        Ok(())
    }

    fn u32(&mut self, v: u32) -> Result<(), SerializeError> {
        self.sink.write_all(&v.to_le_bytes())?;
        Ok(())
    }

    fn string(&mut self, s: &str) -> Result<(), SerializeError> {
        self.u32(s.len() as u32)?;
        self.sink.write_all(s.as_bytes())?;
        Ok(())
    }

    fn kind(&mut self, kind: &OpKind) -> Result<(), SerializeError> {
        self.u8(kind_tag_byte(kind))?;
        match kind {
            OpKind::InputRegister(name) | OpKind::OutputRegister(name) => {
                self.string(name.as_str())
            }
            OpKind::Constant(bits) => self.string(bits),
            OpKind::Icmp(pred) => self.u8(*pred as u8),
            OpKind::Extract { low, high } => {
                self.u32(*low)?;
                self.u32(*high)
            }
            _ => Ok(()),
        }
    }
}

struct Reader<R> {
    source: R,
}

impl<R: Read> Reader<R> {
    fn u8(&mut self) -> Result<u8, SerializeError> {
        let mut buf = [0u8; 1];
        self.source.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn u16(&mut self) -> Result<u16, SerializeError> {
        let mut buf = [0u8; 2];
        self.source.read_exact(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn u32(&mut self) -> Result<u32, SerializeError> {
        let mut buf = [0u8; 4];
        self.source.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn string(&mut self) -> Result<String, SerializeError> {
        let len = self.u32()? as usize;
        let mut buf = vec![0u8; len];
        self.source.read_exact(&mut buf)?;
        String::from_utf8(buf).map_err(|_| SerializeError::BadString)
    }

    fn kind(&mut self) -> Result<OpKind, SerializeError> {
        let tag = tag_from_byte(self.u8()?)?;
        let kind = match tag {
            KindTag::InputRegister => OpKind::InputRegister(self.string()?.into()),
            KindTag::OutputRegister => OpKind::OutputRegister(self.string()?.into()),
            KindTag::Constant => OpKind::Constant(self.string()?),
            KindTag::Advice => OpKind::Advice,
            KindTag::Undefined => OpKind::Undefined,
            KindTag::InputInstructionBits => OpKind::InputInstructionBits,
            KindTag::Add => OpKind::Add,
            KindTag::Sub => OpKind::Sub,
            KindTag::Mul => OpKind::Mul,
            KindTag::And => OpKind::And,
            KindTag::Or => OpKind::Or,
            KindTag::Xor => OpKind::Xor,
            KindTag::Not => OpKind::Not,
            KindTag::Shl => OpKind::Shl,
            KindTag::LShr => OpKind::LShr,
            KindTag::AShr => OpKind::AShr,
            KindTag::Icmp => {
                let pred = self.u8()?;
                let pred = *IcmpPred::ALL
                    .get(pred as usize)
                    .ok_or(SerializeError::BadKindTag(pred))?;
                OpKind::Icmp(pred)
            }
            KindTag::Select => OpKind::Select,
            KindTag::Concat => OpKind::Concat,
            KindTag::Extract => {
                let low = self.u32()?;
                let high = self.u32()?;
                OpKind::Extract { low, high }
            }
            KindTag::ZExt => OpKind::ZExt,
            KindTag::SExt => OpKind::SExt,
            KindTag::Parity => OpKind::Parity,
            KindTag::PopCount => OpKind::PopCount,
            KindTag::DecodeCondition => OpKind::DecodeCondition,
            KindTag::VerifyInstruction => OpKind::VerifyInstruction,
            KindTag::RegConstraint => OpKind::RegConstraint,
            KindTag::Circuit => OpKind::Circuit,
        };
        Ok(kind)
    }
}

impl Circuit {
    /// Writes this circuit to `sink`, all nodes in topological order.
    pub fn serialize<W: Write>(&self, sink: W) -> Result<(), SerializeError> {
        let mut w = Writer { sink };
        w.sink.write_all(&MAGIC)?;
        w.u16(VERSION)?;

        // Global postorder over every node, orphans included, so
        // operands always precede their users in the stream.
        let mut order = Vec::with_capacity(self.len());
        let mut visited: HashSet<OpId> = HashSet::default();
        for op in self.ops() {
            for id in self.topo_order(op.id) {
                if visited.insert(id) {
                    order.push(id);
                }
            }
        }

        w.u32(order.len() as u32)?;
        for id in order {
            let op = self.op(id);
            w.u32(usize::from(op.id) as u32)?;
            w.kind(&op.kind)?;
            w.u32(op.width)?;
            w.u32(op.operands.len() as u32)?;
            for &operand in &op.operands {
                w.u32(usize::from(operand) as u32)?;
            }
            w.u32(op.meta.len() as u32)?;
            for (key, value) in &op.meta {
                w.string(key)?;
                w.string(value)?;
            }
        }

        match self.root() {
            Some(root) => w.u32(usize::from(root) as u32)?,
            None => w.u32(NO_ROOT)?,
        }
        Ok(())
    }

    /// Reads a circuit from `source`, reproducing node ids exactly.
    pub fn deserialize<R: Read>(source: R) -> Result<Circuit, SerializeError> {
        let mut r = Reader { source };

        let mut magic = [0u8; 4];
        r.source.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(SerializeError::BadMagic);
        }
        let version = r.u16()?;
        if version != VERSION {
            return Err(SerializeError::BadVersion(version));
        }

        let node_count = r.u32()?;
        let mut circuit = Circuit::new();
        let mut defined: HashSet<OpId> = HashSet::default();

        for _ in 0..node_count {
            let id = OpId::from(r.u32()? as usize);
            if !defined.insert(id) {
                return Err(SerializeError::DuplicateId(id));
            }
            let kind = r.kind()?;
            let width = r.u32()?;
            let operand_count = r.u32()?;
            let mut operands = Vec::with_capacity(operand_count as usize);
            for _ in 0..operand_count {
                let operand = OpId::from(r.u32()? as usize);
                if !defined.contains(&operand) {
                    return Err(SerializeError::DanglingOperand { node: id, operand });
                }
                operands.push(operand);
            }
            let meta_count = r.u32()?;
            let mut meta = IndexMap::default();
            for _ in 0..meta_count {
                let key = r.string()?;
                let value = r.string()?;
                meta.insert(key, value);
            }
            circuit.insert_with_id(id, kind, width, operands, meta)?;
        }

        let root = r.u32()?;
        if root == NO_ROOT {
            if circuit.root().is_some() {
                return Err(SerializeError::RootMismatch(root));
            }
        } else if circuit.root() != Some(OpId::from(root as usize)) {
            return Err(SerializeError::RootMismatch(root));
        }
        Ok(circuit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncated_stream_is_reported() {
        let mut circuit = Circuit::new();
        let x = circuit
            .create(OpKind::InputRegister("x".into()), 8, &[])
            .unwrap();
        circuit.create(OpKind::Not, 8, &[x]).unwrap();

        let mut bytes = Vec::new();
        circuit.serialize(&mut bytes).unwrap();
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(
            Circuit::deserialize(&bytes[..]),
            Err(SerializeError::Io(_))
        ));
    }

    #[test]
    fn bad_magic_is_reported() {
        assert!(matches!(
            Circuit::deserialize(&b"NOPE\x01\x00"[..]),
            Err(SerializeError::BadMagic)
        ));
    }
}
