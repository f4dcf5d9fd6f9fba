use serde_json::json;

use super::field::FieldRule;
use super::{Reference, ResourceSchema};

pub fn schema() -> ResourceSchema {
    ResourceSchema {
        collection: "master",
        fields: vec![
            FieldRule::text("name"),
            FieldRule::text("slug"),
            FieldRule::text("code"),
            FieldRule::text("group"),
            FieldRule::text("description"),
            FieldRule::integer("sequence"),
            FieldRule::text("image"),
            FieldRule::object_id("parentId").nullable().allow_empty(),
            FieldRule::boolean("parentCode"),
            FieldRule::boolean("isDefault").default_value(json!(false)),
            FieldRule::boolean("isDeleted"),
            FieldRule::boolean("isActive"),
        ],
        references: vec![
            Reference::new("addedBy", "user"),
            Reference::new("updatedBy", "user"),
            Reference::new("parentId", "master"),
        ],
    }
}
