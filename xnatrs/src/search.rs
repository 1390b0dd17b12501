//! Minimal search queries. A query is built against a class's wire type
//! identifier and handed to a session explicitly when run; queries hold no
//! session state of their own.

use serde::Serialize;
use serde_json::Value;

use crate::errors::XnatError;
use crate::listing::result_rows;
use crate::model::ClassSpec;
use crate::object::JsonMap;
use crate::session::XnatSession;
use crate::types::{DataUri, XsiType};

#[derive(Debug, Clone, Serialize)]
pub struct Constraint {
    pub field: String,
    pub operator: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Query {
    xsi_type: XsiType,
    constraints: Vec<Constraint>,
}

impl Query {
    pub fn new(spec: &ClassSpec) -> Query {
        Query {
            xsi_type: spec.query_identifier().clone(),
            constraints: Vec::new(),
        }
    }

    pub fn for_type(xsi_type: XsiType) -> Query {
        Query {
            xsi_type,
            constraints: Vec::new(),
        }
    }

    pub fn xsi_type(&self) -> &XsiType {
        &self.xsi_type
    }

    /// Add a constraint; fields are addressed as `type/field` on the wire.
    pub fn where_(mut self, field: &str, operator: &str, value: &str) -> Query {
        self.constraints.push(Constraint {
            field: format!("{}/{}", self.xsi_type, field),
            operator: operator.to_string(),
            value: value.to_string(),
        });
        self
    }

    /// Run the query and return the raw result rows.
    pub fn run(&self, session: &XnatSession) -> Result<Vec<JsonMap>, XnatError> {
        let body = serde_json::to_string(self).map_err(|_| XnatError::Json("/data/search".into()))?;
        let response = session.post("/data/search", &[("format", "json")], Some(&body))?;
        let json: Value = serde_json::from_str(&response.body)
            .map_err(|_| XnatError::Json("/data/search".to_string()))?;
        result_rows(&json, &DataUri::from("/data/search"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraints_are_qualified_by_the_wire_type() {
        let query = Query::for_type(XsiType::from("xnat:subjectData"))
            .where_("group", "=", "control")
            .where_("age", ">", "18");
        assert_eq!(query.constraints[0].field, "xnat:subjectData/group");
        assert_eq!(query.constraints[1].field, "xnat:subjectData/age");

        let body: Value = serde_json::to_value(&query).unwrap();
        assert_eq!(body["xsi_type"], "xnat:subjectData");
        assert_eq!(body["constraints"][1]["operator"], ">");
    }
}
