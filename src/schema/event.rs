use serde_json::json;

use super::field::{FieldKind, FieldRule};
use super::{Reference, ResourceSchema};

pub fn schema() -> ResourceSchema {
    let address = vec![
        FieldRule::string("line1"),
        FieldRule::string("line2"),
        FieldRule::string("city"),
        FieldRule::string("country"),
        FieldRule::string("state"),
        FieldRule::string("pincode"),
        FieldRule::integer("lat"),
        FieldRule::integer("lng"),
    ];
    let organizer = vec![
        FieldRule::string("name"),
        FieldRule::string("image"),
        FieldRule::string("email"),
        FieldRule::string("url"),
    ];

    ResourceSchema {
        collection: "event",
        fields: vec![
            FieldRule::text("name"),
            FieldRule::text("description"),
            FieldRule::object("address", address).allow(json!(0)),
            FieldRule::date("startDateTime").nullable().allow_empty(),
            FieldRule::date("endDateTime").nullable().allow_empty(),
            FieldRule::new("speakers", FieldKind::array_of(FieldKind::Object(vec![]))),
            FieldRule::object("organizer", organizer),
            FieldRule::text("image"),
            FieldRule::new("attachments", FieldKind::any_array()),
            FieldRule::boolean("isActive"),
            FieldRule::boolean("isDeleted"),
        ],
        references: vec![
            Reference::new("addedBy", "user"),
            Reference::new("updatedBy", "user"),
        ],
    }
}
