//! Workflow tables migration.
//!
//! Creates the five workflow collections. Every table is partitioned by a
//! `tenant` column that is part of the key.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        // ============================================================
        // PART 1: TEMPLATES
        // ============================================================
        db.execute_unprepared(WORKFLOWS_SQL).await?;
        db.execute_unprepared(NODES_SQL).await?;
        db.execute_unprepared(RELATIONS_SQL).await?;

        // ============================================================
        // PART 2: RUNNING INSTANCES
        // ============================================================
        db.execute_unprepared(EXAMPLES_SQL).await?;
        db.execute_unprepared(PROCESSES_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_SQL).await?;
        Ok(())
    }
}

const WORKFLOWS_SQL: &str = r"
CREATE TABLE wf_workflows (
    tenant VARCHAR(64) NOT NULL,
    wf_id VARCHAR(64) NOT NULL,
    wf_name VARCHAR(255) NOT NULL,
    menu_name VARCHAR(255) NOT NULL,
    is_valid BOOLEAN NOT NULL DEFAULT true,
    group_id VARCHAR(64) NOT NULL,
    app_id VARCHAR(64) NOT NULL,
    workflow_type VARCHAR(32) NOT NULL,
    accept_or_dismiss BOOLEAN NOT NULL DEFAULT true,
    params JSONB NOT NULL DEFAULT '{}'::jsonb,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    created_by VARCHAR(64) NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_by VARCHAR(64) NOT NULL,
    PRIMARY KEY (tenant, wf_id),
    CONSTRAINT chk_workflow_type CHECK (workflow_type IN
        ('new-item', 'info-change', 'debt-change', 'midway-cancel', 'contract-expire'))
);

-- Resolution lookup: valid templates of one group for one app
CREATE INDEX idx_wf_workflows_lookup
    ON wf_workflows(tenant, app_id, group_id, created_at DESC) WHERE is_valid;
";

const NODES_SQL: &str = r"
CREATE TABLE wf_nodes (
    tenant VARCHAR(64) NOT NULL,
    wf_id VARCHAR(64) NOT NULL,
    node_id VARCHAR(64) NOT NULL,
    node_name VARCHAR(255) NOT NULL,
    prev_node VARCHAR(64),
    next_node VARCHAR(64),
    assignees JSONB NOT NULL DEFAULT '[]'::jsonb,
    act_type VARCHAR(8) NOT NULL DEFAULT 'or',
    node_group_id VARCHAR(64),
    seq BIGSERIAL NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    created_by VARCHAR(64) NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_by VARCHAR(64) NOT NULL,
    PRIMARY KEY (tenant, wf_id, node_id),
    FOREIGN KEY (tenant, wf_id) REFERENCES wf_workflows(tenant, wf_id),
    CONSTRAINT chk_act_type CHECK (act_type IN ('or', 'and'))
);
";

const RELATIONS_SQL: &str = r"
CREATE TABLE wf_relations (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    tenant VARCHAR(64) NOT NULL,
    app_id VARCHAR(64) NOT NULL,
    object_id VARCHAR(64) NOT NULL,
    group_id VARCHAR(64) NOT NULL,
    workflow_id VARCHAR(64) NOT NULL,
    action VARCHAR(64) NOT NULL DEFAULT '',
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    FOREIGN KEY (tenant, workflow_id) REFERENCES wf_workflows(tenant, wf_id)
);

-- Binding lookup per (app, object, group, action)
CREATE INDEX idx_wf_relations_lookup
    ON wf_relations(tenant, app_id, object_id, group_id, action);
CREATE INDEX idx_wf_relations_workflow ON wf_relations(tenant, workflow_id);
";

const EXAMPLES_SQL: &str = r"
CREATE TABLE wf_examples (
    tenant VARCHAR(64) NOT NULL,
    ex_id VARCHAR(64) NOT NULL,
    wf_id VARCHAR(64) NOT NULL,
    ex_name VARCHAR(255) NOT NULL,
    user_id VARCHAR(64) NOT NULL,
    status SMALLINT NOT NULL DEFAULT 1,
    seq BIGSERIAL NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    created_by VARCHAR(64) NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_by VARCHAR(64) NOT NULL,
    PRIMARY KEY (tenant, ex_id),
    FOREIGN KEY (tenant, wf_id) REFERENCES wf_workflows(tenant, wf_id),
    CONSTRAINT chk_example_status CHECK (status IN (0, 1, 2, 3))
);

CREATE INDEX idx_wf_examples_workflow ON wf_examples(tenant, wf_id, seq DESC);
";

const PROCESSES_SQL: &str = r"
CREATE TABLE wf_processes (
    tenant VARCHAR(64) NOT NULL,
    pro_id VARCHAR(64) NOT NULL,
    ex_id VARCHAR(64) NOT NULL,
    current_node VARCHAR(64) NOT NULL,
    user_id VARCHAR(64) NOT NULL,
    expire_date DATE NOT NULL,
    comment TEXT NOT NULL DEFAULT '',
    status SMALLINT NOT NULL DEFAULT 0,
    seq BIGSERIAL NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    created_by VARCHAR(64) NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_by VARCHAR(64) NOT NULL,
    PRIMARY KEY (tenant, pro_id),
    FOREIGN KEY (tenant, ex_id) REFERENCES wf_examples(tenant, ex_id),
    CONSTRAINT chk_process_status CHECK (status IN (0, 1, 2))
);

CREATE INDEX idx_wf_processes_example ON wf_processes(tenant, ex_id, seq DESC);

-- Pending work queue per approver
CREATE INDEX idx_wf_processes_pending
    ON wf_processes(tenant, user_id, seq DESC) WHERE status = 0;
";

const DROP_SQL: &str = r"
DROP TABLE IF EXISTS wf_processes CASCADE;
DROP TABLE IF EXISTS wf_examples CASCADE;
DROP TABLE IF EXISTS wf_relations CASCADE;
DROP TABLE IF EXISTS wf_nodes CASCADE;
DROP TABLE IF EXISTS wf_workflows CASCADE;
";
