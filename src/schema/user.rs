use super::field::FieldRule;
use super::{Reference, ResourceSchema};

/// Profile fields a user may edit about themselves
pub fn schema() -> ResourceSchema {
    ResourceSchema {
        collection: "user",
        fields: vec![
            FieldRule::text("username"),
            FieldRule::text("email"),
            FieldRule::text("name"),
            FieldRule::text("mobileNo"),
            FieldRule::integer("userType"),
            FieldRule::boolean("isActive"),
            FieldRule::boolean("isDeleted"),
        ],
        references: vec![
            Reference::new("addedBy", "user"),
            Reference::new("updatedBy", "user"),
        ],
    }
}
