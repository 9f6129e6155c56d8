//! List command - print the composition order, categories and exports.

use super::CommandContext;
use anyhow::Result;
use clap::Parser;
use stacksmith::stacks::StackKind;

/// Arguments for the list command
#[derive(Parser, Debug, Clone)]
pub struct ListArgs {
    /// Only these stacks and the stacks they import from
    #[arg(long = "stack", short = 's', action = clap::ArgAction::Append)]
    pub stacks: Vec<StackKind>,

    /// Print the stack dependency graph in DOT format instead
    #[arg(long)]
    pub dot: bool,
}

impl ListArgs {
    /// Execute the list command
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let plan = ctx.plan(&self.stacks)?;
        let graph = ctx.compose(&plan)?;

        if self.dot {
            print!("{}", plan.dependency_graph()?.to_dot());
            return Ok(0);
        }

        if ctx.output.document(&graph.to_manifest())? {
            return Ok(0);
        }

        ctx.output.section("Composition order");
        let rows: Vec<Vec<String>> = graph
            .stacks
            .iter()
            .enumerate()
            .map(|(i, stack)| {
                vec![
                    (i + 1).to_string(),
                    stack.id.clone(),
                    stack.kind.category().to_string(),
                    graph
                        .dependencies
                        .get(&stack.id)
                        .map(|deps| deps.join(", "))
                        .unwrap_or_default(),
                ]
            })
            .collect();
        ctx.output
            .table(&["#", "Stack", "Category", "Imports from"], &rows);

        for stack in &graph.stacks {
            let exports: Vec<String> = stack.export_names().iter().map(|e| e.to_string()).collect();
            ctx.output.list(&format!("{} exports", stack.id), &exports);
        }
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_args_parsing() {
        let args = ListArgs::try_parse_from(["list", "--stack", "network"]).unwrap();
        assert_eq!(args.stacks, vec![StackKind::Network]);
        assert!(!args.dot);

        let args = ListArgs::try_parse_from(["list", "--dot"]).unwrap();
        assert!(args.dot);
    }
}
