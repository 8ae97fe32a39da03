use super::*;

/// Read-only accessors for [`Message`].
///
/// The fields are exposed immutably only; nothing outside allocation writes
/// to them.
impl Message {
    /// Size in bytes of every field.
    pub fn field_size(&self) -> usize {
        self.field_size
    }

    /// Number of fields in the message.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Total payload size, `field_count() * field_size()`.
    pub fn total_size(&self) -> usize {
        self.fields.len() * self.field_size
    }

    /// The bytes of field `index`, if it exists.
    pub fn field(&self, index: usize) -> Option<&[u8]> {
        self.fields.get(index).map(|f| &f[..])
    }

    /// Iterate the fields in order.
    pub fn fields(&self) -> impl Iterator<Item = &[u8]> {
        self.fields.iter().map(|f| &f[..])
    }

    /// Whether every field still holds its fill pattern.
    pub fn is_intact(&self) -> bool {
        self.fields
            .iter()
            .enumerate()
            .all(|(i, f)| f.len() == self.field_size && field_matches(i, f))
    }
}
