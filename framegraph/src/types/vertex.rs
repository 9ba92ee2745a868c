//! Vertex input layout types.

/// Format of a single vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    /// One 32-bit float.
    Float32,
    /// Two 32-bit floats.
    Float32x2,
    /// Three 32-bit floats.
    Float32x3,
    /// Four 32-bit floats.
    Float32x4,
    /// One 32-bit unsigned integer.
    Uint32,
    /// Four 8-bit unsigned normalized values.
    Unorm8x4,
}

impl VertexFormat {
    /// Size in bytes.
    pub fn size(self) -> u32 {
        match self {
            Self::Float32 | Self::Uint32 | Self::Unorm8x4 => 4,
            Self::Float32x2 => 8,
            Self::Float32x3 => 12,
            Self::Float32x4 => 16,
        }
    }
}

/// Whether a stream advances per vertex or per instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VertexInputRate {
    /// Advance once per vertex.
    #[default]
    Vertex,
    /// Advance once per instance.
    Instance,
}

/// One attribute within a vertex stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// Shader input location.
    pub location: u32,
    /// Attribute format.
    pub format: VertexFormat,
    /// Byte offset within one element of the stream.
    pub offset: u32,
}

/// A vertex buffer binding and the attributes it feeds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VertexStream {
    /// Byte stride between elements.
    pub stride: u32,
    /// Step rate.
    pub input_rate: VertexInputRate,
    /// Attributes read from this stream.
    pub attributes: Vec<VertexAttribute>,
}

impl VertexStream {
    /// Create a per-vertex stream with the given stride.
    pub fn per_vertex(stride: u32) -> Self {
        Self {
            stride,
            input_rate: VertexInputRate::Vertex,
            attributes: Vec::new(),
        }
    }

    /// Create a per-instance stream with the given stride.
    pub fn per_instance(stride: u32) -> Self {
        Self {
            stride,
            input_rate: VertexInputRate::Instance,
            attributes: Vec::new(),
        }
    }

    /// Append an attribute.
    pub fn with_attribute(mut self, location: u32, format: VertexFormat, offset: u32) -> Self {
        self.attributes.push(VertexAttribute {
            location,
            format,
            offset,
        });
        self
    }
}
