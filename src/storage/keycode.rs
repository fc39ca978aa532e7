//! Order-preserving key encoding
//!
//! A serde format whose byte output sorts the same way as the encoded values,
//! so an `Engine` range scan over encoded keys walks them in logical order:
//!
//! - `bool`: one byte, 0x00 or 0x01
//! - unsigned integers: big-endian
//! - `i64`: big-endian with the sign bit flipped
//! - bytes and strings: 0x00 escaped as 0x00 0xff, terminated by 0x00 0x00
//! - enum variants: the variant index as one byte, followed by the fields
//! - tuples and structs: fields concatenated
//!
//! The format is not self-describing; only the shapes above are supported.

use serde::{
    de::{self, DeserializeSeed, EnumAccess, IntoDeserializer, SeqAccess, VariantAccess, Visitor},
    ser::{self, Impossible, Serialize},
};

use crate::error::{Error, Result};

/// Serializes a key into its order-preserving byte form
pub fn serialize_key<T: Serialize + ?Sized>(key: &T) -> Result<Vec<u8>> {
    let mut serializer = Serializer { output: Vec::new() };
    key.serialize(&mut serializer)?;
    Ok(serializer.output)
}

/// Deserializes a key, rejecting trailing bytes
pub fn deserialize_key<'a, T: serde::Deserialize<'a>>(input: &'a [u8]) -> Result<T> {
    let mut deserializer = Deserializer { input };
    let value = T::deserialize(&mut deserializer)?;
    if !deserializer.input.is_empty() {
        return Err(Error::Internal(format!(
            "unexpected trailing bytes {:x?}",
            deserializer.input
        )));
    }
    Ok(value)
}

struct Serializer {
    output: Vec<u8>,
}

impl Serializer {
    fn write_escaped(&mut self, bytes: &[u8]) {
        for &b in bytes {
            match b {
                0x00 => self.output.extend_from_slice(&[0x00, 0xff]),
                b => self.output.push(b),
            }
        }
        self.output.extend_from_slice(&[0x00, 0x00]);
    }

    fn write_variant(&mut self, index: u32) -> Result<()> {
        let index = u8::try_from(index)
            .map_err(|_| Error::Internal(format!("variant index {} out of range", index)))?;
        self.output.push(index);
        Ok(())
    }
}

fn unsupported<T>(what: &str) -> Result<T> {
    Err(Error::Internal(format!("keycode does not support {}", what)))
}

impl<'a> ser::Serializer for &'a mut Serializer {
    type Ok = ();
    type Error = Error;

    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Impossible<(), Error>;
    type SerializeStruct = Self;
    type SerializeStructVariant = Impossible<(), Error>;

    fn serialize_bool(self, v: bool) -> Result<()> {
        self.output.push(v as u8);
        Ok(())
    }

    fn serialize_i8(self, _: i8) -> Result<()> {
        unsupported("i8")
    }

    fn serialize_i16(self, _: i16) -> Result<()> {
        unsupported("i16")
    }

    fn serialize_i32(self, _: i32) -> Result<()> {
        unsupported("i32")
    }

    fn serialize_i64(self, v: i64) -> Result<()> {
        let mut bytes = v.to_be_bytes();
        bytes[0] ^= 1 << 7;
        self.output.extend_from_slice(&bytes);
        Ok(())
    }

    fn serialize_u8(self, v: u8) -> Result<()> {
        self.output.push(v);
        Ok(())
    }

    fn serialize_u16(self, v: u16) -> Result<()> {
        self.output.extend_from_slice(&v.to_be_bytes());
        Ok(())
    }

    fn serialize_u32(self, v: u32) -> Result<()> {
        self.output.extend_from_slice(&v.to_be_bytes());
        Ok(())
    }

    fn serialize_u64(self, v: u64) -> Result<()> {
        self.output.extend_from_slice(&v.to_be_bytes());
        Ok(())
    }

    fn serialize_f32(self, _: f32) -> Result<()> {
        unsupported("f32")
    }

    fn serialize_f64(self, _: f64) -> Result<()> {
        unsupported("f64")
    }

    fn serialize_char(self, _: char) -> Result<()> {
        unsupported("char")
    }

    fn serialize_str(self, v: &str) -> Result<()> {
        self.write_escaped(v.as_bytes());
        Ok(())
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<()> {
        self.write_escaped(v);
        Ok(())
    }

    fn serialize_none(self) -> Result<()> {
        unsupported("Option")
    }

    fn serialize_some<T: Serialize + ?Sized>(self, _: &T) -> Result<()> {
        unsupported("Option")
    }

    fn serialize_unit(self) -> Result<()> {
        Ok(())
    }

    fn serialize_unit_struct(self, _: &'static str) -> Result<()> {
        Ok(())
    }

    fn serialize_unit_variant(self, _: &'static str, index: u32, _: &'static str) -> Result<()> {
        self.write_variant(index)
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        value: &T,
    ) -> Result<()> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        index: u32,
        _: &'static str,
        value: &T,
    ) -> Result<()> {
        self.write_variant(index)?;
        value.serialize(self)
    }

    fn serialize_seq(self, _: Option<usize>) -> Result<Self::SerializeSeq> {
        Ok(self)
    }

    fn serialize_tuple(self, _: usize) -> Result<Self::SerializeTuple> {
        Ok(self)
    }

    fn serialize_tuple_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeTupleStruct> {
        Ok(self)
    }

    fn serialize_tuple_variant(
        self,
        _: &'static str,
        index: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        self.write_variant(index)?;
        Ok(self)
    }

    fn serialize_map(self, _: Option<usize>) -> Result<Self::SerializeMap> {
        unsupported("maps")
    }

    fn serialize_struct(self, _: &'static str, _: usize) -> Result<Self::SerializeStruct> {
        Ok(self)
    }

    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeStructVariant> {
        unsupported("struct variants")
    }
}

impl ser::SerializeSeq for &mut Serializer {
    type Ok = ();
    type Error = Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl ser::SerializeTuple for &mut Serializer {
    type Ok = ();
    type Error = Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl ser::SerializeTupleStruct for &mut Serializer {
    type Ok = ();
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl ser::SerializeTupleVariant for &mut Serializer {
    type Ok = ();
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl ser::SerializeStruct for &mut Serializer {
    type Ok = ();
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, _: &'static str, value: &T) -> Result<()> {
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}

struct Deserializer<'de> {
    input: &'de [u8],
}

impl<'de> Deserializer<'de> {
    fn take(&mut self, len: usize) -> Result<&'de [u8]> {
        if self.input.len() < len {
            return Err(Error::Internal(format!(
                "insufficient bytes, expected {} got {}",
                len,
                self.input.len()
            )));
        }
        let (head, tail) = self.input.split_at(len);
        self.input = tail;
        Ok(head)
    }

    fn take_escaped(&mut self) -> Result<Vec<u8>> {
        let mut decoded = Vec::new();
        let mut iter = self.input.iter().enumerate();
        let consumed = loop {
            match iter.next() {
                Some((_, 0x00)) => match iter.next() {
                    Some((i, 0x00)) => break i + 1,
                    Some((_, 0xff)) => decoded.push(0x00),
                    b => {
                        return Err(Error::Internal(format!(
                            "invalid escape sequence {:?}",
                            b.map(|(_, b)| b)
                        )));
                    }
                },
                Some((_, b)) => decoded.push(*b),
                None => return Err(Error::Internal("unterminated byte string".to_string())),
            }
        };
        self.input = &self.input[consumed..];
        Ok(decoded)
    }
}

impl<'de> de::Deserializer<'de> for &mut Deserializer<'de> {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, _: V) -> Result<V::Value> {
        unsupported("self-describing deserialization")
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.take(1)?[0] {
            0x00 => visitor.visit_bool(false),
            0x01 => visitor.visit_bool(true),
            b => Err(Error::Internal(format!("invalid boolean byte {:x}", b))),
        }
    }

    fn deserialize_i8<V: Visitor<'de>>(self, _: V) -> Result<V::Value> {
        unsupported("i8")
    }

    fn deserialize_i16<V: Visitor<'de>>(self, _: V) -> Result<V::Value> {
        unsupported("i16")
    }

    fn deserialize_i32<V: Visitor<'de>>(self, _: V) -> Result<V::Value> {
        unsupported("i32")
    }

    fn deserialize_i64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let mut bytes: [u8; 8] = self.take(8)?.try_into()?;
        bytes[0] ^= 1 << 7;
        visitor.visit_i64(i64::from_be_bytes(bytes))
    }

    fn deserialize_u8<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_u8(self.take(1)?[0])
    }

    fn deserialize_u16<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_u16(u16::from_be_bytes(self.take(2)?.try_into()?))
    }

    fn deserialize_u32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_u32(u32::from_be_bytes(self.take(4)?.try_into()?))
    }

    fn deserialize_u64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_u64(u64::from_be_bytes(self.take(8)?.try_into()?))
    }

    fn deserialize_f32<V: Visitor<'de>>(self, _: V) -> Result<V::Value> {
        unsupported("f32")
    }

    fn deserialize_f64<V: Visitor<'de>>(self, _: V) -> Result<V::Value> {
        unsupported("f64")
    }

    fn deserialize_char<V: Visitor<'de>>(self, _: V) -> Result<V::Value> {
        unsupported("char")
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_string(String::from_utf8(self.take_escaped()?)?)
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_string(String::from_utf8(self.take_escaped()?)?)
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_byte_buf(self.take_escaped()?)
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_byte_buf(self.take_escaped()?)
    }

    fn deserialize_option<V: Visitor<'de>>(self, _: V) -> Result<V::Value> {
        unsupported("Option")
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, _: V) -> Result<V::Value> {
        unsupported("variable-length sequences")
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, len: usize, visitor: V) -> Result<V::Value> {
        visitor.visit_seq(Fields { de: self, remaining: len })
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _: &'static str,
        len: usize,
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_seq(Fields { de: self, remaining: len })
    }

    fn deserialize_map<V: Visitor<'de>>(self, _: V) -> Result<V::Value> {
        unsupported("maps")
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_seq(Fields {
            de: self,
            remaining: fields.len(),
        })
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _: &'static str,
        _: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_enum(self)
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, _: V) -> Result<V::Value> {
        unsupported("identifiers")
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, _: V) -> Result<V::Value> {
        unsupported("ignored values")
    }
}

/// Fixed number of consecutive fields (tuples, structs, tuple variants)
struct Fields<'a, 'de> {
    de: &'a mut Deserializer<'de>,
    remaining: usize,
}

impl<'de> SeqAccess<'de> for Fields<'_, 'de> {
    type Error = Error;

    fn next_element_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<Option<T::Value>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        seed.deserialize(&mut *self.de).map(Some)
    }
}

impl<'de> EnumAccess<'de> for &mut Deserializer<'de> {
    type Error = Error;
    type Variant = Self;

    fn variant_seed<V: DeserializeSeed<'de>>(self, seed: V) -> Result<(V::Value, Self::Variant)> {
        let index = self.take(1)?[0] as u32;
        let value = seed.deserialize(IntoDeserializer::<'de, Error>::into_deserializer(index))?;
        Ok((value, self))
    }
}

impl<'de> VariantAccess<'de> for &mut Deserializer<'de> {
    type Error = Error;

    fn unit_variant(self) -> Result<()> {
        Ok(())
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(self, seed: T) -> Result<T::Value> {
        seed.deserialize(self)
    }

    fn tuple_variant<V: Visitor<'de>>(self, len: usize, visitor: V) -> Result<V::Value> {
        visitor.visit_seq(Fields { de: self, remaining: len })
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        _: &'static [&'static str],
        _: V,
    ) -> Result<V::Value> {
        unsupported("struct variants")
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::{deserialize_key, serialize_key};
    use crate::error::Result;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    enum Key {
        Counter,
        Marker(u64),
        Entry(#[serde(with = "serde_bytes")] Vec<u8>, u64),
        Name(String, i64),
    }

    #[test]
    fn test_encoding() -> Result<()> {
        assert_eq!(serialize_key(&Key::Counter)?, vec![0x00]);
        assert_eq!(
            serialize_key(&Key::Marker(7))?,
            vec![0x01, 0, 0, 0, 0, 0, 0, 0, 7]
        );
        assert_eq!(
            serialize_key(&Key::Entry(vec![b'a', 0x00, b'b'], 1))?,
            vec![0x02, b'a', 0x00, 0xff, b'b', 0x00, 0x00, 0, 0, 0, 0, 0, 0, 0, 1]
        );
        Ok(())
    }

    #[test]
    fn test_decode() -> Result<()> {
        for key in [
            Key::Counter,
            Key::Marker(u64::MAX),
            Key::Entry(vec![0x00, 0x00, 0xff], 42),
            Key::Name("albums".to_string(), -5),
        ] {
            let encoded = serialize_key(&key)?;
            assert_eq!(deserialize_key::<Key>(&encoded)?, key);
        }
        assert!(deserialize_key::<Key>(&[0x01, 0x00]).is_err());
        Ok(())
    }

    #[test]
    fn test_ordering() -> Result<()> {
        let keys = [
            Key::Entry(b"a".to_vec(), 9),
            Key::Entry(b"a\x00".to_vec(), 1),
            Key::Entry(b"ab".to_vec(), 0),
            Key::Entry(b"ab".to_vec(), 3),
            Key::Entry(b"b".to_vec(), 0),
            Key::Name("x".to_string(), -10),
            Key::Name("x".to_string(), 0),
            Key::Name("x".to_string(), 10),
        ];
        let encoded = keys
            .iter()
            .map(serialize_key)
            .collect::<Result<Vec<_>>>()?;
        let mut sorted = encoded.clone();
        sorted.sort();
        assert_eq!(encoded, sorted);
        Ok(())
    }
}
