//! Wire codec for cluster request and response headers
//!
//! Every message starts with a fixed 48-byte header: a 16-byte common
//! prefix followed by a 32-byte opcode-specific half. The half comes
//! in three shapes (generic, object, VDI); which one applies is
//! determined by the opcode. All integers are little-endian on the
//! wire. Payloads follow the header and are delimited by
//! `data_length`.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

use super::types::{HeaderShape, Opcode, SD_HEADER_SIZE, SD_PROTO_VER};

/// Opcode-specific half of a request header
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    /// Untyped opcode-specific words
    Generic([u32; 8]),
    /// Object addressing (READ_OBJ, WRITE_OBJ, CREATE_AND_WRITE_OBJ,
    /// DISCARD_OBJ, FLUSH_VDI)
    Object {
        oid: u64,
        cow_oid: u64,
        copies: u32,
        offset: u64,
    },
    /// VDI addressing (NEW_VDI, LOCK_VDI, RELEASE_VDI, GET_VDI_INFO,
    /// DEL_VDI)
    Vdi {
        vdi_size: u64,
        vdi_id: u32,
        copies: u32,
        snapid: u32,
    },
}

impl RequestBody {
    fn shape(&self) -> HeaderShape {
        match self {
            RequestBody::Generic(_) => HeaderShape::Generic,
            RequestBody::Object { .. } => HeaderShape::Object,
            RequestBody::Vdi { .. } => HeaderShape::Vdi,
        }
    }
}

/// A request header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub proto_ver: u8,
    pub opcode: Opcode,
    pub flags: u16,
    pub epoch: u32,
    pub id: u32,
    pub data_length: u32,
    pub body: RequestBody,
}

impl Request {
    /// Object-shaped request with the common fields defaulted.
    pub fn object(
        opcode: Opcode,
        flags: u16,
        data_length: u32,
        oid: u64,
        cow_oid: u64,
        copies: u32,
        offset: u64,
    ) -> Self {
        Self {
            proto_ver: SD_PROTO_VER,
            opcode,
            flags,
            epoch: 0,
            id: 0,
            data_length,
            body: RequestBody::Object {
                oid,
                cow_oid,
                copies,
                offset,
            },
        }
    }

    /// VDI-shaped request with the common fields defaulted.
    pub fn vdi(
        opcode: Opcode,
        flags: u16,
        data_length: u32,
        vdi_size: u64,
        vdi_id: u32,
        copies: u32,
        snapid: u32,
    ) -> Self {
        Self {
            proto_ver: SD_PROTO_VER,
            opcode,
            flags,
            epoch: 0,
            id: 0,
            data_length,
            body: RequestBody::Vdi {
                vdi_size,
                vdi_id,
                copies,
                snapid,
            },
        }
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        if self.body.shape() != self.opcode.shape() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("body shape does not match opcode {:?}", self.opcode),
            ));
        }

        writer.write_u8(self.proto_ver)?;
        writer.write_u8(self.opcode as u8)?;
        writer.write_u16::<LittleEndian>(self.flags)?;
        writer.write_u32::<LittleEndian>(self.epoch)?;
        writer.write_u32::<LittleEndian>(self.id)?;
        writer.write_u32::<LittleEndian>(self.data_length)?;

        match self.body {
            RequestBody::Generic(words) => {
                for w in words {
                    writer.write_u32::<LittleEndian>(w)?;
                }
            }
            RequestBody::Object {
                oid,
                cow_oid,
                copies,
                offset,
            } => {
                writer.write_u64::<LittleEndian>(oid)?;
                writer.write_u64::<LittleEndian>(cow_oid)?;
                writer.write_u32::<LittleEndian>(copies)?;
                writer.write_u32::<LittleEndian>(0)?; // reserved
                writer.write_u64::<LittleEndian>(offset)?;
            }
            RequestBody::Vdi {
                vdi_size,
                vdi_id,
                copies,
                snapid,
            } => {
                writer.write_u64::<LittleEndian>(vdi_size)?;
                writer.write_u32::<LittleEndian>(vdi_id)?;
                writer.write_u32::<LittleEndian>(copies)?;
                writer.write_u32::<LittleEndian>(snapid)?;
                writer.write_u32::<LittleEndian>(0)?; // reserved
                writer.write_u32::<LittleEndian>(0)?;
                writer.write_u32::<LittleEndian>(0)?;
            }
        }

        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let proto_ver = reader.read_u8()?;
        let opcode_byte = reader.read_u8()?;
        let opcode = Opcode::try_from(opcode_byte).map_err(|b| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown opcode: 0x{:02x}", b),
            )
        })?;
        let flags = reader.read_u16::<LittleEndian>()?;
        let epoch = reader.read_u32::<LittleEndian>()?;
        let id = reader.read_u32::<LittleEndian>()?;
        let data_length = reader.read_u32::<LittleEndian>()?;

        let body = match opcode.shape() {
            HeaderShape::Generic => {
                let mut words = [0u32; 8];
                reader.read_u32_into::<LittleEndian>(&mut words)?;
                RequestBody::Generic(words)
            }
            HeaderShape::Object => {
                let oid = reader.read_u64::<LittleEndian>()?;
                let cow_oid = reader.read_u64::<LittleEndian>()?;
                let copies = reader.read_u32::<LittleEndian>()?;
                let _reserved = reader.read_u32::<LittleEndian>()?;
                let offset = reader.read_u64::<LittleEndian>()?;
                RequestBody::Object {
                    oid,
                    cow_oid,
                    copies,
                    offset,
                }
            }
            HeaderShape::Vdi => {
                let vdi_size = reader.read_u64::<LittleEndian>()?;
                let vdi_id = reader.read_u32::<LittleEndian>()?;
                let copies = reader.read_u32::<LittleEndian>()?;
                let snapid = reader.read_u32::<LittleEndian>()?;
                let mut reserved = [0u32; 3];
                reader.read_u32_into::<LittleEndian>(&mut reserved)?;
                RequestBody::Vdi {
                    vdi_size,
                    vdi_id,
                    copies,
                    snapid,
                }
            }
        };

        Ok(Self {
            proto_ver,
            opcode,
            flags,
            epoch,
            id,
            data_length,
            body,
        })
    }

    /// Encode into a fixed header buffer.
    pub fn to_bytes(&self) -> io::Result<[u8; SD_HEADER_SIZE]> {
        let mut buf = [0u8; SD_HEADER_SIZE];
        self.write_to(&mut &mut buf[..])?;
        Ok(buf)
    }
}

/// Opcode-specific half of a response header, after the result word
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    /// Untyped opcode-specific words
    Generic([u32; 7]),
    /// Object operation response
    Object { copies: u32 },
    /// VDI operation response
    Vdi { vdi_id: u32 },
}

impl ResponseBody {
    fn shape(&self) -> HeaderShape {
        match self {
            ResponseBody::Generic(_) => HeaderShape::Generic,
            ResponseBody::Object { .. } => HeaderShape::Object,
            ResponseBody::Vdi { .. } => HeaderShape::Vdi,
        }
    }
}

/// A response header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub proto_ver: u8,
    pub opcode: Opcode,
    pub flags: u16,
    pub epoch: u32,
    pub id: u32,
    pub data_length: u32,
    pub result: u32,
    pub body: ResponseBody,
}

impl Response {
    /// Object-shaped response with the common fields defaulted.
    pub fn object(opcode: Opcode, result: u32, data_length: u32, copies: u32) -> Self {
        Self {
            proto_ver: SD_PROTO_VER,
            opcode,
            flags: 0,
            epoch: 0,
            id: 0,
            data_length,
            result,
            body: ResponseBody::Object { copies },
        }
    }

    /// VDI-shaped response with the common fields defaulted.
    pub fn vdi(opcode: Opcode, result: u32, vdi_id: u32) -> Self {
        Self {
            proto_ver: SD_PROTO_VER,
            opcode,
            flags: 0,
            epoch: 0,
            id: 0,
            data_length: 0,
            result,
            body: ResponseBody::Vdi { vdi_id },
        }
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        if self.body.shape() != self.opcode.shape() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("body shape does not match opcode {:?}", self.opcode),
            ));
        }

        writer.write_u8(self.proto_ver)?;
        writer.write_u8(self.opcode as u8)?;
        writer.write_u16::<LittleEndian>(self.flags)?;
        writer.write_u32::<LittleEndian>(self.epoch)?;
        writer.write_u32::<LittleEndian>(self.id)?;
        writer.write_u32::<LittleEndian>(self.data_length)?;
        writer.write_u32::<LittleEndian>(self.result)?;

        match self.body {
            ResponseBody::Generic(words) => {
                for w in words {
                    writer.write_u32::<LittleEndian>(w)?;
                }
            }
            ResponseBody::Object { copies } => {
                writer.write_u32::<LittleEndian>(copies)?;
                for _ in 0..6 {
                    writer.write_u32::<LittleEndian>(0)?; // reserved
                }
            }
            ResponseBody::Vdi { vdi_id } => {
                writer.write_u32::<LittleEndian>(0)?; // reserved
                writer.write_u32::<LittleEndian>(vdi_id)?;
                for _ in 0..5 {
                    writer.write_u32::<LittleEndian>(0)?;
                }
            }
        }

        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let proto_ver = reader.read_u8()?;
        let opcode_byte = reader.read_u8()?;
        let opcode = Opcode::try_from(opcode_byte).map_err(|b| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown opcode: 0x{:02x}", b),
            )
        })?;
        let flags = reader.read_u16::<LittleEndian>()?;
        let epoch = reader.read_u32::<LittleEndian>()?;
        let id = reader.read_u32::<LittleEndian>()?;
        let data_length = reader.read_u32::<LittleEndian>()?;
        let result = reader.read_u32::<LittleEndian>()?;

        let body = match opcode.shape() {
            HeaderShape::Generic => {
                let mut words = [0u32; 7];
                reader.read_u32_into::<LittleEndian>(&mut words)?;
                ResponseBody::Generic(words)
            }
            HeaderShape::Object => {
                let copies = reader.read_u32::<LittleEndian>()?;
                let mut reserved = [0u32; 6];
                reader.read_u32_into::<LittleEndian>(&mut reserved)?;
                ResponseBody::Object { copies }
            }
            HeaderShape::Vdi => {
                let _reserved = reader.read_u32::<LittleEndian>()?;
                let vdi_id = reader.read_u32::<LittleEndian>()?;
                let mut pad = [0u32; 5];
                reader.read_u32_into::<LittleEndian>(&mut pad)?;
                ResponseBody::Vdi { vdi_id }
            }
        };

        Ok(Self {
            proto_ver,
            opcode,
            flags,
            epoch,
            id,
            data_length,
            result,
            body,
        })
    }

    /// Encode into a fixed header buffer.
    pub fn to_bytes(&self) -> io::Result<[u8; SD_HEADER_SIZE]> {
        let mut buf = [0u8; SD_HEADER_SIZE];
        self.write_to(&mut &mut buf[..])?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::{vid_to_data_oid, SdResult, SD_FLAG_CMD_COW, SD_FLAG_CMD_WRITE};

    #[test]
    fn test_object_request_layout() {
        let req = Request::object(
            Opcode::ReadObj,
            0,
            0x1000,
            vid_to_data_oid(7, 3),
            0,
            3,
            1024,
        );
        let bytes = req.to_bytes().unwrap();

        let mut expect = [0u8; SD_HEADER_SIZE];
        expect[0] = 0x01; // proto_ver
        expect[1] = 0x02; // READ_OBJ
        expect[12..16].copy_from_slice(&0x1000u32.to_le_bytes());
        expect[16..24].copy_from_slice(&0x0000_0007_0000_0003u64.to_le_bytes());
        expect[32..36].copy_from_slice(&3u32.to_le_bytes());
        expect[40..48].copy_from_slice(&1024u64.to_le_bytes());
        assert_eq!(bytes, expect);
    }

    #[test]
    fn test_request_round_trip_all_shapes() {
        let cases = vec![
            Request::object(
                Opcode::CreateAndWriteObj,
                SD_FLAG_CMD_WRITE | SD_FLAG_CMD_COW,
                512,
                vid_to_data_oid(7, 5),
                vid_to_data_oid(4, 5),
                2,
                0,
            ),
            Request::vdi(Opcode::LockVdi, SD_FLAG_CMD_WRITE, 512, 0, 0, 0, 0),
            Request::vdi(Opcode::ReleaseVdi, 0, 0, 0, 9, 0, 0),
            Request {
                proto_ver: SD_PROTO_VER,
                opcode: Opcode::ReadVdis,
                flags: 0,
                epoch: 0,
                id: 0,
                data_length: 4096,
                body: RequestBody::Generic([1, 2, 3, 4, 5, 6, 7, 8]),
            },
        ];

        for req in cases {
            let bytes = req.to_bytes().unwrap();
            let decoded = Request::read_from(&mut &bytes[..]).unwrap();
            assert_eq!(decoded, req);
            assert_eq!(decoded.to_bytes().unwrap(), bytes);
        }
    }

    #[test]
    fn test_response_round_trip_all_shapes() {
        let cases = vec![
            Response::object(Opcode::WriteObj, SdResult::Success as u32, 0, 3),
            Response::object(Opcode::ReadObj, SdResult::Success as u32, 4096, 3),
            Response::vdi(Opcode::LockVdi, SdResult::Success as u32, 7),
            Response {
                proto_ver: SD_PROTO_VER,
                opcode: Opcode::ReadVdis,
                flags: 0,
                epoch: 9,
                id: 1,
                data_length: 0,
                result: SdResult::Success as u32,
                body: ResponseBody::Generic([0; 7]),
            },
        ];

        for rsp in cases {
            let bytes = rsp.to_bytes().unwrap();
            let decoded = Response::read_from(&mut &bytes[..]).unwrap();
            assert_eq!(decoded, rsp);
            assert_eq!(decoded.to_bytes().unwrap(), bytes);
        }
    }

    #[test]
    fn test_decode_then_encode_is_identity() {
        let mut bytes = [0u8; SD_HEADER_SIZE];
        bytes[0] = 0x01;
        bytes[1] = 0x16; // FLUSH_VDI, object shape
        bytes[16..24].copy_from_slice(&(1u64 << 63).to_le_bytes());

        let decoded = Request::read_from(&mut &bytes[..]).unwrap();
        assert_eq!(decoded.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let req = Request {
            proto_ver: SD_PROTO_VER,
            opcode: Opcode::ReadObj,
            flags: 0,
            epoch: 0,
            id: 0,
            data_length: 0,
            body: RequestBody::Vdi {
                vdi_size: 0,
                vdi_id: 0,
                copies: 0,
                snapid: 0,
            },
        };
        assert!(req.to_bytes().is_err());
    }

    #[test]
    fn test_unknown_opcode_rejected() {
        let mut bytes = [0u8; SD_HEADER_SIZE];
        bytes[0] = 0x01;
        bytes[1] = 0x7f;
        assert!(Request::read_from(&mut &bytes[..]).is_err());
        assert!(Response::read_from(&mut &bytes[..]).is_err());
    }
}
