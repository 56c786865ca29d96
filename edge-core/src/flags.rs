use bitflags::bitflags;

bitflags! {
    /// Flags attached to a codec input or output buffer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferFlags: u32 {
        /// Buffer holds codec parameter sets, not picture data.
        const CODEC_CONFIG  = 1 << 1;
        /// Buffer holds an IDR picture.
        const KEY_FRAME     = 1 << 0;
    }
}

impl BufferFlags {
    pub fn is_config(self) -> bool {
        self.contains(BufferFlags::CODEC_CONFIG)
    }
}
