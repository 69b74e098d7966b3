//! Project listing

use super::scanned;
use crate::config::Config;
use crate::gcp::projects::Project;
use crate::report::{Record, ReportWriter};
use anyhow::Result;
use std::io::Write;

impl Record for Project {
    const HEADERS: &'static [&'static str] = &["PROJECT_ID", "NAME", "PROJECT_NUMBER", "STATE"];
    const WIDTHS: &'static [usize] = &[30, 40, 15, 20];

    fn fields(&self) -> Vec<String> {
        vec![
            self.project_id.clone(),
            self.name.clone(),
            self.project_number.clone(),
            self.lifecycle_state.to_string(),
        ]
    }
}

pub fn export<W: Write, C: Write>(
    projects: &[Project],
    config: &Config,
    sink: &mut ReportWriter<Project, W, C>,
) -> Result<()> {
    sink.write_all(scanned(projects, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gcp::projects::LifecycleState;

    #[test]
    fn test_export_projects() {
        let projects = vec![
            Project {
                project_id: "billing-prd".to_string(),
                name: "Billing".to_string(),
                project_number: "1001".to_string(),
                lifecycle_state: LifecycleState::Active,
            },
            Project {
                project_id: "old-dev".to_string(),
                name: "Old".to_string(),
                project_number: "1002".to_string(),
                lifecycle_state: LifecycleState::DeleteRequested,
            },
        ];

        let mut out = Vec::new();
        let mut sink = ReportWriter::new(&mut out, std::io::sink()).unwrap();
        export(&projects, &Config::default(), &mut sink).unwrap();
        assert_eq!(sink.finish().unwrap(), 2);

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "PROJECT_ID;NAME;PROJECT_NUMBER;STATE\n\
             billing-prd;Billing;1001;ACTIVE\n\
             old-dev;Old;1002;DELETE_REQUESTED\n"
        );
    }
}
